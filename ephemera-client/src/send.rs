//! Optimistic send bookkeeping.
//!
//! A send is accepted synchronously: the provisional entry lands in the store
//! before any network I/O, and the caller gets its id back. The server response
//! later either confirms the entry or rolls it back and hands the text back as
//! a draft.

use rand::Rng;
use shared::models::{
    Author, CreateMessageRequest, Message, MessageId, PROVISIONAL_PREFIX, Timestamp,
    validate_content,
};
use tracing::{debug, warn};

use crate::{
    error::{ClientError, ClientResult},
    store::{ConfirmOutcome, MessageStore},
};

/// Generates a `temp-<unix millis>-<random hex>` id.
#[must_use]
pub fn provisional_id(now: Timestamp) -> MessageId {
    let suffix: u32 = rand::rng().random();
    MessageId::new(format!(
        "{PROVISIONAL_PREFIX}{}-{suffix:08x}",
        now.0.timestamp_millis()
    ))
}

/// A send that has been applied locally and is awaiting the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub provisional_id: MessageId,
    pub request: CreateMessageRequest,
}

/// Result of resolving a pending send.
#[derive(Debug)]
pub enum SendOutcome {
    Confirmed(ConfirmOutcome),
    /// The provisional entry was removed; `draft` is the text to restore.
    Failed { draft: String, error: ClientError },
    /// The completion did not match the send in flight and was ignored.
    Stale,
}

/// Enforces one in-flight send per sender and applies optimistic updates.
#[derive(Debug, Default)]
pub struct SendGate {
    in_flight: Option<PendingSend>,
}

impl SendGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<&PendingSend> {
        self.in_flight.as_ref()
    }

    /// Validates `raw`, appends a provisional message and marks the send in flight.
    ///
    /// # Errors
    /// Returns [`ClientError::Validation`] for empty or oversized content and
    /// [`ClientError::SendInFlight`] while another send is outstanding. The
    /// store is untouched in both cases.
    pub fn begin(
        &mut self,
        store: &mut MessageStore,
        author: &Author,
        raw: &str,
        now: Timestamp,
    ) -> ClientResult<PendingSend> {
        let content = validate_content(raw)?;
        if self.in_flight.is_some() {
            return Err(ClientError::SendInFlight);
        }

        let provisional_id = provisional_id(now);
        store.upsert(Message::new(
            provisional_id.clone(),
            author,
            content.clone(),
            now,
        ));

        let pending = PendingSend {
            provisional_id,
            request: CreateMessageRequest {
                user_id: author.id,
                username: author.username.clone(),
                content,
            },
        };
        debug!(provisional_id = %pending.provisional_id, "optimistic message appended");
        self.in_flight = Some(pending.clone());
        Ok(pending)
    }

    /// Applies the server's answer for `provisional_id`.
    pub fn complete(
        &mut self,
        store: &mut MessageStore,
        provisional_id: &MessageId,
        result: ClientResult<Message>,
    ) -> SendOutcome {
        let Some(pending) = self
            .in_flight
            .take_if(|pending| &pending.provisional_id == provisional_id)
        else {
            warn!(%provisional_id, "completion for unknown send ignored");
            return SendOutcome::Stale;
        };

        match result {
            Ok(message) => {
                let outcome = store.confirm(provisional_id, message);
                debug!(%provisional_id, ?outcome, "send confirmed");
                SendOutcome::Confirmed(outcome)
            }
            Err(error) => {
                store.remove(provisional_id);
                warn!(%provisional_id, error = %error, "send failed, provisional message removed");
                SendOutcome::Failed {
                    draft: pending.request.content,
                    error,
                }
            }
        }
    }
}
