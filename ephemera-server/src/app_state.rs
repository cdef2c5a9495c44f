use std::sync::Arc;

use crate::services::{ChangeFeed, ChatRepository};

/// State shared by every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) repository: Arc<dyn ChatRepository>,
    pub(crate) feed: ChangeFeed,
}

impl AppState {
    #[must_use]
    pub fn new(repository: Arc<dyn ChatRepository>, feed: ChangeFeed) -> Self {
        Self { repository, feed }
    }

    #[must_use]
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}
