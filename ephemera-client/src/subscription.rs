//! Change feed subscription with bounded reconnects.
//!
//! [`SubscriptionMachine`] holds the pure transition rules; the manager task
//! drives it from the lifecycle reports of a [`FeedChannel`] and forwards row
//! changes to the session.

use metrics::counter;
use shared::{config::client::SubscriptionConfig, models::{Message, MessageId}};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep, timeout, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::remote::{ChannelStatus, FeedChannel, FeedSignal, RemoteStore};

/// Connection state of the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Connecting,
    Subscribed,
    /// Push abandoned; only reconciliation keeps the view fresh.
    Degraded,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Degraded => "degraded",
        };
        f.write_str(label)
    }
}

/// Row change forwarded to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Insert(Message),
    Delete(MessageId),
}

/// What the driver should do after a lifecycle report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Subscribed,
    Reconnect(Duration),
    Degraded,
}

/// Pure reconnect policy: bounded retries, then degraded for good.
#[derive(Debug, Clone)]
pub struct SubscriptionMachine {
    state: SubscriptionState,
    retry_count: u32,
    max_retries: u32,
    error_delay: Duration,
    timeout_delay: Duration,
}

impl SubscriptionMachine {
    #[must_use]
    pub fn new(config: &SubscriptionConfig) -> Self {
        Self {
            state: SubscriptionState::Disconnected,
            retry_count: 0,
            max_retries: config.max_retries,
            error_delay: config.error_backoff(),
            timeout_delay: config.timeout_backoff(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Marks a connection attempt. Ignored once degraded.
    pub fn begin_connect(&mut self) {
        if self.state != SubscriptionState::Degraded {
            self.state = SubscriptionState::Connecting;
        }
    }

    pub fn on_status(&mut self, status: ChannelStatus) -> Transition {
        if self.state == SubscriptionState::Degraded {
            return Transition::None;
        }

        match status {
            ChannelStatus::Connecting => Transition::None,
            ChannelStatus::Subscribed => {
                self.state = SubscriptionState::Subscribed;
                self.retry_count = 0;
                Transition::Subscribed
            }
            ChannelStatus::ChannelError | ChannelStatus::TimedOut | ChannelStatus::Closed => {
                if self.retry_count < self.max_retries {
                    self.retry_count += 1;
                    self.state = SubscriptionState::Connecting;
                    let delay = if status == ChannelStatus::TimedOut {
                        self.timeout_delay
                    } else {
                        self.error_delay
                    };
                    Transition::Reconnect(delay)
                } else {
                    self.state = SubscriptionState::Degraded;
                    Transition::Degraded
                }
            }
        }
    }
}

/// Owns the change feed for one session.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    remote: Arc<dyn RemoteStore>,
    config: SubscriptionConfig,
}

/// Running subscription; stop it to tear the feed down.
#[derive(Debug)]
pub struct SubscriptionHandle {
    state: watch::Receiver<SubscriptionState>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    /// Cancels the feed and waits for the manager task to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "subscription task ended abnormally");
        }
    }
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, config: SubscriptionConfig) -> Self {
        Self { remote, config }
    }

    /// Spawns the manager task. It stops when `parent` is cancelled or the
    /// handle is stopped.
    #[must_use]
    pub fn start(
        self,
        updates: mpsc::Sender<FeedUpdate>,
        parent: &CancellationToken,
    ) -> SubscriptionHandle {
        let token = parent.child_token();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Disconnected);
        let task = tokio::spawn(self.run(updates, state_tx, token.clone()));

        SubscriptionHandle {
            state: state_rx,
            token,
            task,
        }
    }

    async fn run(
        self,
        updates: mpsc::Sender<FeedUpdate>,
        state_tx: watch::Sender<SubscriptionState>,
        token: CancellationToken,
    ) {
        let mut machine = SubscriptionMachine::new(&self.config);

        loop {
            machine.begin_connect();
            state_tx.send_replace(machine.state());

            let status = tokio::select! {
                () = token.cancelled() => break,
                status = self.connect_and_pump(&mut machine, &state_tx, &updates) => status,
            };

            match machine.on_status(status) {
                Transition::Reconnect(delay) => {
                    counter!("ephemera_subscription_reconnects_total").increment(1);
                    info!(
                        ?status,
                        retry = machine.retry_count(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "change feed lost, reconnecting"
                    );
                    state_tx.send_replace(machine.state());
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = sleep(delay) => {}
                    }
                }
                Transition::Degraded => {
                    counter!("ephemera_subscription_degraded_total").increment(1);
                    warn!(?status, "change feed retries exhausted, falling back to polling");
                    state_tx.send_replace(SubscriptionState::Degraded);
                    return;
                }
                Transition::None | Transition::Subscribed => {}
            }
        }

        debug!("subscription stopped");
    }

    /// Opens one connection and pumps it until it reports a terminal status.
    async fn connect_and_pump(
        &self,
        machine: &mut SubscriptionMachine,
        state_tx: &watch::Sender<SubscriptionState>,
        updates: &mpsc::Sender<FeedUpdate>,
    ) -> ChannelStatus {
        let deadline = Instant::now() + self.config.connect_deadline();

        let mut channel: FeedChannel = match timeout_at(deadline, self.remote.subscribe()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(err)) => {
                warn!(error = %err, "change feed subscribe failed");
                return ChannelStatus::ChannelError;
            }
            Err(_) => return ChannelStatus::TimedOut,
        };

        loop {
            let signal = if machine.state() == SubscriptionState::Subscribed {
                match timeout(self.config.idle_deadline(), channel.recv()).await {
                    Ok(signal) => signal,
                    Err(_) => {
                        warn!(
                            idle_secs = self.config.idle_timeout,
                            "change feed went quiet"
                        );
                        return ChannelStatus::TimedOut;
                    }
                }
            } else {
                match timeout_at(deadline, channel.recv()).await {
                    Ok(signal) => signal,
                    Err(_) => return ChannelStatus::TimedOut,
                }
            };

            match signal {
                None => return ChannelStatus::Closed,
                Some(FeedSignal::Status(status)) if status.is_terminal() => return status,
                Some(FeedSignal::Status(status)) => {
                    if machine.on_status(status) == Transition::Subscribed {
                        info!("change feed subscribed");
                        state_tx.send_replace(machine.state());
                    }
                }
                Some(FeedSignal::Alive) => {}
                Some(FeedSignal::Insert(message)) => {
                    forward(machine, updates, FeedUpdate::Insert(message)).await;
                }
                Some(FeedSignal::Delete(id)) => {
                    forward(machine, updates, FeedUpdate::Delete(id)).await;
                }
            }
        }
    }
}

async fn forward(
    machine: &SubscriptionMachine,
    updates: &mpsc::Sender<FeedUpdate>,
    update: FeedUpdate,
) {
    if machine.state() != SubscriptionState::Subscribed {
        debug!(?update, "change before subscription acknowledgement dropped");
        return;
    }
    if updates.send(update).await.is_err() {
        debug!("session gone, change dropped");
    }
}
