//! Change feed events carried over server-sent events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Message, MessageId};

/// SSE event name for the connection acknowledgement.
pub const EVENT_SUBSCRIBED: &str = "subscribed";
/// SSE event name for a newly inserted message.
pub const EVENT_INSERT: &str = "message.insert";
/// SSE event name for a deleted message.
pub const EVENT_DELETE: &str = "message.delete";
/// SSE event name for keep-alive frames.
pub const EVENT_PING: &str = "ping";

/// Payload of a `message.delete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedMessage {
    /// Id of the removed row.
    pub id: MessageId,
}

/// A typed change feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The server accepted the subscription.
    Subscribed,
    /// A message row was inserted.
    Insert(Message),
    /// A message row was deleted.
    Delete(DeletedMessage),
    /// Keep-alive.
    Ping,
}

/// Why an incoming SSE frame could not be turned into a [`ChangeEvent`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event type '{0}'")]
    UnknownEvent(String),
    #[error("invalid payload for '{event}': {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid payload for '{event}': {reason}")]
    Invalid {
        event: &'static str,
        reason: &'static str,
    },
}

impl ChangeEvent {
    /// SSE event name for this variant.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Subscribed => EVENT_SUBSCRIBED,
            Self::Insert(_) => EVENT_INSERT,
            Self::Delete(_) => EVENT_DELETE,
            Self::Ping => EVENT_PING,
        }
    }

    /// Serialises the event payload for the SSE `data:` field.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialised.
    pub fn data(&self) -> serde_json::Result<String> {
        match self {
            Self::Subscribed | Self::Ping => Ok("{}".to_string()),
            Self::Insert(message) => serde_json::to_string(message),
            Self::Delete(deleted) => serde_json::to_string(deleted),
        }
    }

    /// Validates an SSE frame into a typed event.
    ///
    /// # Errors
    /// Returns [`EventDecodeError`] for unknown event names, unparsable JSON or
    /// payloads that violate the message invariants.
    pub fn decode(event: &str, data: &str) -> Result<Self, EventDecodeError> {
        match event {
            EVENT_SUBSCRIBED => Ok(Self::Subscribed),
            EVENT_PING => Ok(Self::Ping),
            EVENT_INSERT => {
                let message: Message =
                    serde_json::from_str(data).map_err(|source| EventDecodeError::Payload {
                        event: EVENT_INSERT,
                        source,
                    })?;
                if message.id.as_str().is_empty() {
                    return Err(EventDecodeError::Invalid {
                        event: EVENT_INSERT,
                        reason: "empty message id",
                    });
                }
                if message.id.is_provisional() {
                    return Err(EventDecodeError::Invalid {
                        event: EVENT_INSERT,
                        reason: "provisional id from server",
                    });
                }
                if message.expires_at <= message.created_at {
                    return Err(EventDecodeError::Invalid {
                        event: EVENT_INSERT,
                        reason: "expiry precedes creation",
                    });
                }
                Ok(Self::Insert(message))
            }
            EVENT_DELETE => {
                let deleted: DeletedMessage =
                    serde_json::from_str(data).map_err(|source| EventDecodeError::Payload {
                        event: EVENT_DELETE,
                        source,
                    })?;
                if deleted.id.as_str().is_empty() {
                    return Err(EventDecodeError::Invalid {
                        event: EVENT_DELETE,
                        reason: "empty message id",
                    });
                }
                Ok(Self::Delete(deleted))
            }
            other => Err(EventDecodeError::UnknownEvent(other.to_string())),
        }
    }
}
