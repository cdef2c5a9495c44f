//! Remote purge of expired messages and stale identities.

use chrono::TimeDelta;
use metrics::counter;
use shared::{config::client::CleanupConfig, models::Timestamp};
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, warn};

use crate::{clock::Clock, remote::RemoteStore};

/// What one cleanup pass removed. `None` means that step failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub messages_deleted: Option<u64>,
    pub users_deleted: Option<u64>,
}

/// Cancels the loop when dropped, so a discarded service stops too.
#[derive(Debug)]
struct Worker {
    cancel: DropGuard,
    task: JoinHandle<()>,
}

/// Runs cleanup passes once on start and then on a fixed interval.
#[derive(Debug)]
pub struct CleanupService {
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    config: CleanupConfig,
    worker: Option<Worker>,
}

impl CleanupService {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, config: CleanupConfig) -> Self {
        Self {
            remote,
            clock,
            config,
            worker: None,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.task.is_finished())
    }

    /// Starts the periodic loop. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let token = CancellationToken::new();
        let remote = Arc::clone(&self.remote);
        let clock = Arc::clone(&self.clock);
        let retention = retention_delta(&self.config);
        let every = self.config.every();
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                run_pass(remote.as_ref(), clock.as_ref(), retention).await;
            }
        });

        info!(interval_secs = self.config.interval, "cleanup service started");
        self.worker = Some(Worker {
            cancel: token.drop_guard(),
            task,
        });
        true
    }

    /// Stops the loop and waits for an in-progress pass to be abandoned.
    pub async fn stop(&mut self) {
        if let Some(Worker { cancel, task }) = self.worker.take() {
            drop(cancel);
            if let Err(err) = task.await {
                warn!(error = %err, "cleanup task ended abnormally");
            }
            info!("cleanup service stopped");
        }
    }

    /// Runs one pass now, independent of the schedule.
    pub async fn trigger(&self) -> CleanupReport {
        run_pass(
            self.remote.as_ref(),
            self.clock.as_ref(),
            retention_delta(&self.config),
        )
        .await
    }
}

fn retention_delta(config: &CleanupConfig) -> TimeDelta {
    TimeDelta::from_std(config.retention()).unwrap_or(TimeDelta::MAX)
}

/// Deletes expired messages and inactive non-operator users. Errors are
/// logged and reported as `None` in the result.
pub async fn run_pass(
    remote: &dyn RemoteStore,
    clock: &dyn Clock,
    retention: TimeDelta,
) -> CleanupReport {
    let now = clock.now();

    let messages_deleted = match remote.delete_expired(now).await {
        Ok(count) => {
            counter!("ephemera_cleanup_messages_deleted_total").increment(count);
            Some(count)
        }
        Err(err) => {
            error!(error = %err, "failed to delete expired messages");
            None
        }
    };

    let cutoff = Timestamp(
        now.0
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC),
    );
    let users_deleted = match remote.delete_inactive_users(cutoff).await {
        Ok(count) => {
            counter!("ephemera_cleanup_users_deleted_total").increment(count);
            Some(count)
        }
        Err(err) => {
            error!(error = %err, "failed to delete inactive users");
            None
        }
    };

    info!(
        messages = ?messages_deleted,
        users = ?users_deleted,
        "cleanup pass finished"
    );
    CleanupReport {
        messages_deleted,
        users_deleted,
    }
}
