//! Periodic full-state reconciliation.
//!
//! The first tick fires immediately and doubles as the initial fetch, so a new
//! session and a recovering one load state through the same path.

use shared::models::Message;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::remote::RemoteStore;

/// Fetches the full message list on a fixed interval.
#[derive(Debug)]
pub struct Reconciler {
    remote: Arc<dyn RemoteStore>,
    every: Duration,
}

impl Reconciler {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, every: Duration) -> Self {
        Self { remote, every }
    }

    /// Spawns the loop. Each successful fetch is delivered on `snapshots`,
    /// sorted by creation time.
    #[must_use]
    pub fn spawn(
        self,
        snapshots: mpsc::Sender<Vec<Message>>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let fetched = tokio::select! {
                    () = token.cancelled() => break,
                    fetched = self.remote.fetch_all() => fetched,
                };

                match fetched {
                    Ok(mut messages) => {
                        messages.sort_by_key(|message| message.created_at);
                        debug!(count = messages.len(), "reconciliation snapshot fetched");
                        if snapshots.send(messages).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "reconciliation fetch failed, retrying next tick");
                    }
                }
            }
        })
    }
}
