use reqwest::StatusCode;
use shared::models::{ErrorResponse, ValidationError};
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced by the engine and its remote store.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with {status}: {problem}")]
    Status {
        status: StatusCode,
        problem: ErrorResponse,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a message from this sender is already being sent")]
    SendInFlight,

    #[error("chat session is closed")]
    SessionClosed,

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// `true` for errors a retry on the next tick may resolve.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
