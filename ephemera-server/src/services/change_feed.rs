//! Fan-out of row changes to connected SSE subscribers.

use metrics::counter;
use shared::models::ChangeEvent;
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Delivers `event` to every current subscriber. Having none is fine.
    pub fn publish(&self, event: ChangeEvent) {
        let name = event.event_name();
        let delivered = self.sender.send(event).unwrap_or(0);
        counter!("ephemera_feed_events_published_total", "event" => name).increment(1);
        trace!(event = name, delivered, "change published");
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
