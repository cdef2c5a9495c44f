//! Storage seam for messages and identities.

use async_trait::async_trait;
use shared::models::{Author, Message, MessageId, Timestamp, User};
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted display name, in characters after trimming.
pub const MAX_USERNAME_CHARS: usize = 32;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Trims `raw` and checks it is a usable display name.
///
/// # Errors
/// Returns [`RepositoryError::Validation`] for blank or overlong names.
pub fn validate_username(raw: &str) -> RepositoryResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::Validation(
            "username must not be empty".to_string(),
        ));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_USERNAME_CHARS {
        return Err(RepositoryError::Validation(format!(
            "username is {chars} characters; the limit is {MAX_USERNAME_CHARS}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Persistence operations behind the HTTP API.
///
/// Implementations assign message ids and expiry; callers pass already
/// validated content.
#[async_trait]
pub trait ChatRepository: Send + Sync + std::fmt::Debug {
    /// Messages with `expires_at > now`, ascending by creation.
    async fn list_live(&self, now: Timestamp) -> RepositoryResult<Vec<Message>>;

    async fn insert_message(
        &self,
        author: &Author,
        content: &str,
        now: Timestamp,
    ) -> RepositoryResult<Message>;

    /// Deletes every message with `expires_at <= before` and returns their ids.
    async fn delete_expired(&self, before: Timestamp) -> RepositoryResult<Vec<MessageId>>;

    /// Creates `username`, or refreshes `last_active` if it already exists.
    async fn register_user(&self, username: &str, now: Timestamp) -> RepositoryResult<User>;

    async fn touch_user(&self, id: Uuid, now: Timestamp) -> RepositoryResult<()>;

    async fn online_count(&self, since: Timestamp) -> RepositoryResult<u64>;

    /// Deletes non-operator users last seen before `before`.
    async fn delete_inactive_users(&self, before: Timestamp) -> RepositoryResult<u64>;

    /// Readiness check.
    async fn ping(&self) -> RepositoryResult<()>;
}
