//! The engine's view of the authoritative message store.

use async_trait::async_trait;
use shared::models::{CreateMessageRequest, Message, MessageId, Timestamp};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ClientResult;

/// Lifecycle reports from a change feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    /// `true` for reports that end the current connection.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ChannelError | Self::TimedOut | Self::Closed)
    }
}

/// One item delivered by a change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSignal {
    Status(ChannelStatus),
    /// Keep-alive from the server; proves the connection still delivers.
    Alive,
    Insert(Message),
    Delete(MessageId),
}

/// A live change feed connection.
///
/// Dropping the channel tears the connection down.
#[derive(Debug)]
pub struct FeedChannel {
    signals: mpsc::Receiver<FeedSignal>,
    teardown: CancellationToken,
}

impl FeedChannel {
    #[must_use]
    pub fn new(signals: mpsc::Receiver<FeedSignal>, teardown: CancellationToken) -> Self {
        Self { signals, teardown }
    }

    /// Next signal, or `None` once the producer has gone away.
    pub async fn recv(&mut self) -> Option<FeedSignal> {
        self.signals.recv().await
    }

    pub fn close(&self) {
        self.teardown.cancel();
    }
}

impl Drop for FeedChannel {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}

/// Remote store operations the engine depends on.
#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug {
    /// All non-expired messages, ascending by `created_at`.
    async fn fetch_all(&self) -> ClientResult<Vec<Message>>;

    /// Persists a message; the server assigns id and timestamps.
    async fn insert(&self, request: &CreateMessageRequest) -> ClientResult<Message>;

    /// Deletes messages whose expiry is at or before `now`.
    async fn delete_expired(&self, now: Timestamp) -> ClientResult<u64>;

    /// Deletes non-operator users inactive since before `cutoff`.
    async fn delete_inactive_users(&self, cutoff: Timestamp) -> ClientResult<u64>;

    /// Refreshes the user's last-active timestamp.
    async fn touch_presence(&self, user_id: Uuid) -> ClientResult<()>;

    /// Number of users active since `since`.
    async fn online_count(&self, since: Timestamp) -> ClientResult<u64>;

    /// Opens a change feed connection.
    async fn subscribe(&self) -> ClientResult<FeedChannel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_channel_cancels_teardown() {
        let (tx, rx) = mpsc::channel(4);
        let teardown = CancellationToken::new();
        let channel = FeedChannel::new(rx, teardown.clone());

        tx.send(FeedSignal::Status(ChannelStatus::Subscribed))
            .await
            .unwrap();
        drop(channel);

        assert!(teardown.is_cancelled());
        assert!(tx.is_closed());
    }

    #[test]
    fn terminal_statuses() {
        assert!(ChannelStatus::ChannelError.is_terminal());
        assert!(ChannelStatus::TimedOut.is_terminal());
        assert!(ChannelStatus::Closed.is_terminal());
        assert!(!ChannelStatus::Subscribed.is_terminal());
        assert!(!ChannelStatus::Connecting.is_terminal());
    }
}
