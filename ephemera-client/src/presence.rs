//! Presence heartbeat and online counting.

use chrono::TimeDelta;
use shared::models::Timestamp;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{clock::Clock, error::ClientResult, remote::RemoteStore};

/// Users active within this window count as online.
pub const ONLINE_WINDOW: TimeDelta = TimeDelta::minutes(5);

/// Start of the online window ending at `now`.
#[must_use]
pub fn online_since(now: Timestamp) -> Timestamp {
    Timestamp(now.0 - ONLINE_WINDOW)
}

/// Number of users seen within [`ONLINE_WINDOW`].
///
/// # Errors
/// Propagates the remote store error.
pub async fn online_count(remote: &dyn RemoteStore, clock: &dyn Clock) -> ClientResult<u64> {
    remote.online_count(online_since(clock.now())).await
}

/// Spawns the heartbeat loop; the first beat is sent immediately.
#[must_use]
pub fn spawn_heartbeat(
    remote: Arc<dyn RemoteStore>,
    user_id: Uuid,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match remote.touch_presence(user_id).await {
                Ok(()) => debug!(%user_id, "presence refreshed"),
                Err(err) => warn!(%user_id, error = %err, "presence heartbeat failed"),
            }
        }
    })
}
