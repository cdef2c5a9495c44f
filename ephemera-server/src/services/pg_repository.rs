//! Postgres-backed [`ChatRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    expiry::expires_at_for,
    models::{Author, Message, MessageId, Timestamp, User},
};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::repository::{ChatRepository, RepositoryError, RepositoryResult};
use crate::db::bootstrap;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    user_id: Uuid,
    username: String,
    content: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::from(row.id),
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            created_at: Timestamp(row.created_at),
            expires_at: Timestamp(row.expires_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    is_op: bool,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            is_op: row.is_op,
            created_at: Timestamp(row.created_at),
            last_active: Timestamp(row.last_active),
        }
    }
}

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl std::fmt::Debug for PgChatRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgChatRepository").finish_non_exhaustive()
    }
}

impl PgChatRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    #[instrument(name = "repo.list_live", skip(self), err)]
    async fn list_live(&self, now: Timestamp) -> RepositoryResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, user_id, username, content, created_at, expires_at \
             FROM messages WHERE expires_at > $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(now.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    #[instrument(name = "repo.insert_message", skip(self, content), err)]
    async fn insert_message(
        &self,
        author: &Author,
        content: &str,
        now: Timestamp,
    ) -> RepositoryResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (id, user_id, username, content, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, username, content, created_at, expires_at",
        )
        .bind(Uuid::new_v4())
        .bind(author.id)
        .bind(&author.username)
        .bind(content)
        .bind(now.0)
        .bind(expires_at_for(now).0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    #[instrument(name = "repo.delete_expired", skip(self), err)]
    async fn delete_expired(&self, before: Timestamp) -> RepositoryResult<Vec<MessageId>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM messages WHERE expires_at <= $1 RETURNING id")
                .bind(before.0)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(MessageId::from).collect())
    }

    #[instrument(name = "repo.register_user", skip(self), err)]
    async fn register_user(&self, username: &str, now: Timestamp) -> RepositoryResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, username, is_op, created_at, last_active) \
             VALUES ($1, $2, FALSE, $3, $3) \
             ON CONFLICT (username) DO UPDATE SET last_active = EXCLUDED.last_active \
             RETURNING id, username, is_op, created_at, last_active",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(now.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    #[instrument(name = "repo.touch_user", skip(self), err)]
    async fn touch_user(&self, id: Uuid, now: Timestamp) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET last_active = $2 WHERE id = $1")
            .bind(id)
            .bind(now.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    #[instrument(name = "repo.online_count", skip(self), err)]
    async fn online_count(&self, since: Timestamp) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE last_active >= $1")
            .bind(since.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[instrument(name = "repo.delete_inactive_users", skip(self), err)]
    async fn delete_inactive_users(&self, before: Timestamp) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM users WHERE is_op = FALSE AND last_active < $1")
            .bind(before.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        bootstrap::ensure_readiness(&self.pool).await?;
        Ok(())
    }
}
