use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;
use uuid::Uuid;

use super::Timestamp;
use crate::expiry::MESSAGE_LIFETIME;

/// Prefix that marks an id as locally generated and not yet confirmed by the server.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Upper bound on message content, counted in characters after trimming.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Opaque message identifier.
///
/// Server-assigned ids are UUID strings; provisional ids carry [`PROVISIONAL_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `true` when the id was generated locally for an unconfirmed message.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// The identity a message is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Identity id.
    pub id: Uuid,
    /// Display name shown next to the message.
    pub username: String,
}

/// A single chat message with a fixed lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned or provisional identifier.
    pub id: MessageId,

    /// Id of the author.
    pub user_id: Uuid,

    /// Display name of the author at send time.
    pub username: String,

    /// Trimmed message text.
    pub content: String,

    /// When the message was created.
    pub created_at: Timestamp,

    /// When the message stops being visible. Always `created_at + MESSAGE_LIFETIME`.
    pub expires_at: Timestamp,
}

impl Message {
    /// Builds a message whose expiry is derived from its creation time.
    pub fn new(
        id: MessageId,
        author: &Author,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id: author.id,
            username: author.username.clone(),
            content: content.into(),
            created_at,
            expires_at: Timestamp(created_at.0 + MESSAGE_LIFETIME),
        }
    }

    /// `true` when this entry has not been confirmed by the server yet.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    /// The author this message is attributed to.
    #[must_use]
    pub fn author(&self) -> Author {
        Author {
            id: self.user_id,
            username: self.username.clone(),
        }
    }
}

/// Request body for `POST /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Id of the sending user.
    pub user_id: Uuid,

    /// Display name of the sending user.
    pub username: String,

    /// Message text.
    pub content: String,
}

/// Response body for `GET /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    /// Non-expired messages, ascending by creation time.
    pub messages: Vec<Message>,
}

/// Response body for bulk delete endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedCount {
    /// Number of rows removed.
    pub deleted: u64,
}

/// Reasons message content is rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Content was empty or whitespace only.
    #[error("message content must not be empty")]
    Empty,
    /// Content exceeded [`MAX_CONTENT_CHARS`].
    #[error("message content is {actual} characters, limit is {max}")]
    TooLong {
        /// Configured limit.
        max: usize,
        /// Observed length.
        actual: usize,
    },
}

/// Trims `content` and checks it against the length bounds.
///
/// # Errors
/// Returns [`ValidationError`] when the trimmed content is empty or too long.
pub fn validate_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let actual = trimmed.chars().count();
    if actual > MAX_CONTENT_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_CONTENT_CHARS,
            actual,
        });
    }

    Ok(trimmed.to_string())
}
