//! In-process [`ChatRepository`] used by `serve --in-memory` and the tests.

use async_trait::async_trait;
use shared::models::{Author, Message, MessageId, Timestamp, User};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repository::{ChatRepository, RepositoryError, RepositoryResult};

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<Message>,
    users: Vec<User>,
}

#[derive(Debug, Default)]
pub struct InMemoryChatRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryChatRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a message as-is, bypassing id and expiry assignment.
    pub async fn seed_message(&self, message: Message) {
        self.state.lock().await.messages.push(message);
    }

    /// Stores a user as-is. Operators can only be provisioned this way.
    pub async fn seed_user(&self, user: User) {
        self.state.lock().await.users.push(user);
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.lock().await.users.clone()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn list_live(&self, now: Timestamp) -> RepositoryResult<Vec<Message>> {
        let state = self.state.lock().await;
        let mut live: Vec<Message> = state
            .messages
            .iter()
            .filter(|message| message.expires_at > now)
            .cloned()
            .collect();
        live.sort_by_key(|message| message.created_at);
        Ok(live)
    }

    async fn insert_message(
        &self,
        author: &Author,
        content: &str,
        now: Timestamp,
    ) -> RepositoryResult<Message> {
        let message = Message::new(MessageId::from(Uuid::new_v4()), author, content, now);
        self.state.lock().await.messages.push(message.clone());
        Ok(message)
    }

    async fn delete_expired(&self, before: Timestamp) -> RepositoryResult<Vec<MessageId>> {
        let mut state = self.state.lock().await;
        let mut removed = Vec::new();
        state.messages.retain(|message| {
            if message.expires_at <= before {
                removed.push(message.id.clone());
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn register_user(&self, username: &str, now: Timestamp) -> RepositoryResult<User> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.users.iter_mut().find(|user| user.username == username) {
            existing.last_active = now;
            return Ok(existing.clone());
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            is_op: false,
            created_at: now,
            last_active: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn touch_user(&self, id: Uuid, now: Timestamp) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;
        user.last_active = now;
        Ok(())
    }

    async fn online_count(&self, since: Timestamp) -> RepositoryResult<u64> {
        let state = self.state.lock().await;
        let online = state
            .users
            .iter()
            .filter(|user| user.last_active >= since)
            .count();
        Ok(online as u64)
    }

    async fn delete_inactive_users(&self, before: Timestamp) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let count = state.users.len();
        state
            .users
            .retain(|user| user.is_op || user.last_active >= before);
        Ok((count - state.users.len()) as u64)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
