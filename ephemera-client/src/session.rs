//! The chat session actor.
//!
//! One task owns the [`MessageStore`] and applies everything that mutates it:
//! sends and their completions, feed updates, reconciliation snapshots and
//! expiry sweeps. Network work runs in spawned tasks that report back over
//! channels, so the store never needs a lock.

use metrics::counter;
use shared::{
    config::client::ClientConfig,
    models::{Author, Message, MessageId},
};
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::{ClientError, ClientResult},
    presence::spawn_heartbeat,
    remote::RemoteStore,
    send::{SendGate, SendOutcome},
    store::MessageStore,
    subscription::{FeedUpdate, SubscriptionHandle, SubscriptionManager, SubscriptionState},
    sync::Reconciler,
};

const EVENT_BUFFER: usize = 64;
const FEED_BUFFER: usize = 256;
const NOTICE_BUFFER: usize = 16;

/// User-facing notifications raised by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A send was rolled back; `draft` holds the text to restore.
    SendFailed { draft: String, reason: String },
}

enum SessionEvent {
    Send {
        content: String,
        reply: oneshot::Sender<ClientResult<MessageId>>,
    },
    SendCompleted {
        provisional_id: MessageId,
        result: ClientResult<Message>,
    },
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send { .. } => f.write_str("Send"),
            Self::SendCompleted { provisional_id, .. } => f
                .debug_struct("SendCompleted")
                .field("provisional_id", provisional_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Cloneable front door to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    view: watch::Receiver<Vec<Message>>,
    notices: broadcast::Sender<Notice>,
    subscription: watch::Receiver<SubscriptionState>,
}

impl SessionHandle {
    /// Sends `content` optimistically.
    ///
    /// Returns the provisional id once the message is visible locally; the
    /// server round trip continues in the background.
    ///
    /// # Errors
    /// Returns a validation error, [`ClientError::SendInFlight`] when a send is
    /// outstanding, or [`ClientError::SessionClosed`] after the session stopped.
    pub async fn send(&self, content: impl Into<String>) -> ClientResult<MessageId> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(SessionEvent::Send {
                content: content.into(),
                reply,
            })
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        response.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Current view, ascending by creation.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.view.borrow().clone()
    }

    /// Receiver that changes whenever the view does.
    #[must_use]
    pub fn watch_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.view.clone()
    }

    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    #[must_use]
    pub fn subscription_state(&self) -> SubscriptionState {
        *self.subscription.borrow()
    }

    #[must_use]
    pub fn watch_subscription(&self) -> watch::Receiver<SubscriptionState> {
        self.subscription.clone()
    }
}

/// A running chat session and the tasks it owns.
///
/// Dropping the session cancels every task it started; [`ChatSession::stop`]
/// also waits for them to finish.
#[derive(Debug)]
pub struct ChatSession {
    handle: SessionHandle,
    teardown: DropGuard,
    subscription: SubscriptionHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Starts the actor, the reconciliation loop, the heartbeat and the change
    /// feed subscription.
    #[must_use]
    pub fn start(
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        author: Author,
        config: &ClientConfig,
    ) -> Self {
        let token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (feed_tx, feed_rx) = mpsc::channel(FEED_BUFFER);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        let (view_tx, view_rx) = watch::channel(Vec::new());
        let (notices_tx, _) = broadcast::channel(NOTICE_BUFFER);

        let subscription = SubscriptionManager::new(
            Arc::clone(&remote),
            config.subscription.clone(),
        )
        .start(feed_tx, &token);

        let reconciler = Reconciler::new(Arc::clone(&remote), config.sync.reconcile_every())
            .spawn(snapshot_tx, token.child_token());
        let heartbeat = spawn_heartbeat(
            Arc::clone(&remote),
            author.id,
            config.sync.heartbeat_every(),
            token.child_token(),
        );

        info!(user = %author.username, "chat session started");
        let actor = SessionActor {
            store: MessageStore::new(),
            gate: SendGate::new(),
            author,
            clock,
            remote,
            events_tx: events_tx.clone(),
            view_tx,
            notices_tx: notices_tx.clone(),
            submissions: JoinSet::new(),
        };
        let actor_task = tokio::spawn(actor.run(
            events_rx,
            feed_rx,
            snapshot_rx,
            config.sync.sweep_every(),
            token.child_token(),
        ));

        Self {
            handle: SessionHandle {
                events: events_tx,
                view: view_rx,
                notices: notices_tx,
                subscription: subscription.watch(),
            },
            teardown: token.drop_guard(),
            subscription,
            tasks: vec![actor_task, reconciler, heartbeat],
        }
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Cancels every task and waits for them. In-flight sends are abandoned.
    pub async fn stop(self) {
        drop(self.teardown);
        self.subscription.stop().await;
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "session task ended abnormally");
            }
        }
        info!("chat session stopped");
    }
}

struct SessionActor {
    store: MessageStore,
    gate: SendGate,
    author: Author,
    clock: Arc<dyn Clock>,
    remote: Arc<dyn RemoteStore>,
    events_tx: mpsc::Sender<SessionEvent>,
    view_tx: watch::Sender<Vec<Message>>,
    notices_tx: broadcast::Sender<Notice>,
    submissions: JoinSet<()>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut feed: mpsc::Receiver<FeedUpdate>,
        mut snapshots: mpsc::Receiver<Vec<Message>>,
        sweep_every: std::time::Duration,
        token: CancellationToken,
    ) {
        let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                Some(event) = events.recv() => self.handle_event(event),
                Some(update) = feed.recv() => self.apply_feed(update),
                Some(snapshot) = snapshots.recv() => self.apply_snapshot(snapshot),
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.submissions.abort_all();
        debug!("session actor stopped");
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.store.snapshot());
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Send { content, reply } => {
                let accepted =
                    self.gate
                        .begin(&mut self.store, &self.author, &content, self.clock.now());
                let response = accepted.map(|pending| {
                    self.publish();
                    let remote = Arc::clone(&self.remote);
                    let events = self.events_tx.clone();
                    let provisional_id = pending.provisional_id.clone();
                    self.submissions.spawn(async move {
                        let result = remote.insert(&pending.request).await;
                        let _ = events
                            .send(SessionEvent::SendCompleted {
                                provisional_id: pending.provisional_id,
                                result,
                            })
                            .await;
                    });
                    provisional_id
                });
                let _ = reply.send(response);
            }
            SessionEvent::SendCompleted {
                provisional_id,
                result,
            } => {
                while self.submissions.try_join_next().is_some() {}
                self.handle_completion(&provisional_id, result);
            }
        }
    }

    fn handle_completion(&mut self, provisional_id: &MessageId, result: ClientResult<Message>) {
        match self.gate.complete(&mut self.store, provisional_id, result) {
            SendOutcome::Confirmed(_) => {
                counter!("ephemera_messages_sent_total").increment(1);
                self.publish();
            }
            SendOutcome::Failed { draft, error } => {
                self.publish();
                let _ = self.notices_tx.send(Notice::SendFailed {
                    draft,
                    reason: error.to_string(),
                });
            }
            SendOutcome::Stale => {}
        }
    }

    fn apply_feed(&mut self, update: FeedUpdate) {
        match update {
            FeedUpdate::Insert(message) => {
                let outcome = self.store.reconcile_incoming(message);
                debug!(?outcome, "feed insert applied");
                self.publish();
            }
            FeedUpdate::Delete(id) => {
                if self.store.remove(&id).is_some() {
                    debug!(%id, "feed delete applied");
                    self.publish();
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: Vec<Message>) {
        if self.store.replace_all(snapshot, self.clock.now()) {
            counter!("ephemera_sync_applied_total").increment(1);
            debug!(count = self.store.len(), "reconciliation snapshot applied");
            self.publish();
        }
    }

    fn sweep(&mut self) {
        let removed = self.store.remove_expired(self.clock.now());
        if removed > 0 {
            debug!(removed, "expired messages swept");
            self.publish();
        }
    }
}
