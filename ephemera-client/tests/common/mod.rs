//! In-memory remote store and helpers shared by the engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use client::{
    ChannelStatus, ClientError, ClientResult, Clock, FeedChannel, FeedSignal, ManualClock,
    RemoteStore, SessionHandle, SubscriptionState,
};
use reqwest::StatusCode;
use shared::{
    expiry::is_expired,
    models::{Author, CreateMessageRequest, ErrorResponse, Message, MessageId, Timestamp, User},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{Semaphore, mpsc, watch},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// How `subscribe` behaves for a given fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Acknowledge immediately, then ping every 15 s like the server.
    Accept,
    /// Acknowledge, then never send anything again.
    Mute,
    /// Report a channel error immediately.
    Reject,
    /// Never acknowledge.
    Silent,
}

#[derive(Debug, Default)]
struct Backend {
    messages: Vec<Message>,
    users: Vec<User>,
    feeds: Vec<mpsc::Sender<FeedSignal>>,
    silent: Vec<mpsc::Sender<FeedSignal>>,
    next_id: u64,
    touches: Vec<Uuid>,
    cleanup_passes: usize,
    fail_inserts: bool,
    fail_cleanup: bool,
}

/// Remote store fake. Siblings share rows and clock but not feed behaviour.
#[derive(Debug)]
pub struct FakeRemote {
    backend: Arc<Mutex<Backend>>,
    clock: ManualClock,
    mode: Mutex<FeedMode>,
    subscribe_calls: AtomicUsize,
    insert_gate: Mutex<Option<Arc<Semaphore>>>,
}

pub fn t0() -> Timestamp {
    Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap())
}

pub fn author(name: &str) -> Author {
    Author {
        id: Uuid::new_v4(),
        username: name.to_string(),
    }
}

pub fn user(name: &str, is_op: bool, last_active: Timestamp) -> User {
    User {
        id: Uuid::new_v4(),
        username: name.to_string(),
        is_op,
        created_at: last_active,
        last_active,
    }
}

impl FakeRemote {
    pub fn new(clock: ManualClock) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(Mutex::new(Backend::default())),
            clock,
            mode: Mutex::new(FeedMode::Accept),
            subscribe_calls: AtomicUsize::new(0),
            insert_gate: Mutex::new(None),
        })
    }

    pub fn sibling(&self) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::clone(&self.backend),
            clock: self.clock.clone(),
            mode: Mutex::new(FeedMode::Accept),
            subscribe_calls: AtomicUsize::new(0),
            insert_gate: Mutex::new(None),
        })
    }

    pub fn set_feed_mode(&self, mode: FeedMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Blocks inserts until permits are added to the returned semaphore.
    pub fn hold_inserts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.insert_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.backend.lock().unwrap().fail_inserts = fail;
    }

    pub fn fail_cleanup(&self, fail: bool) {
        self.backend.lock().unwrap().fail_cleanup = fail;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.backend.lock().unwrap().messages.clone()
    }

    pub fn seed(&self, message: Message) {
        self.backend.lock().unwrap().messages.push(message);
    }

    pub fn add_user(&self, user: User) {
        self.backend.lock().unwrap().users.push(user);
    }

    pub fn users(&self) -> Vec<User> {
        self.backend.lock().unwrap().users.clone()
    }

    pub fn touches(&self) -> usize {
        self.backend.lock().unwrap().touches.len()
    }

    pub fn cleanup_passes(&self) -> usize {
        self.backend.lock().unwrap().cleanup_passes
    }

    /// Deletes a row and announces it on the feeds.
    pub async fn remove_row(&self, id: &MessageId) {
        self.backend
            .lock()
            .unwrap()
            .messages
            .retain(|message| &message.id != id);
        self.push(FeedSignal::Delete(id.clone())).await;
    }

    /// Delivers `signal` to every live feed.
    pub async fn push(&self, signal: FeedSignal) {
        let feeds = {
            let mut backend = self.backend.lock().unwrap();
            backend.feeds.retain(|feed| !feed.is_closed());
            backend.feeds.clone()
        };
        for feed in feeds {
            let _ = feed.send(signal.clone()).await;
        }
    }

    fn unavailable() -> ClientError {
        ClientError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            problem: ErrorResponse::with_code("internal_error", "backend unavailable"),
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_all(&self) -> ClientResult<Vec<Message>> {
        let now = self.clock.now();
        let mut messages: Vec<Message> = self
            .backend
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|message| !is_expired(message.expires_at, now))
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }

    async fn insert(&self, request: &CreateMessageRequest) -> ClientResult<Message> {
        let gate = self.insert_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("insert gate closed").forget();
        }

        let message = {
            let mut backend = self.backend.lock().unwrap();
            if backend.fail_inserts {
                return Err(Self::unavailable());
            }
            backend.next_id += 1;
            let message = Message::new(
                MessageId::new(format!("m{}", backend.next_id)),
                &Author {
                    id: request.user_id,
                    username: request.username.clone(),
                },
                request.content.clone(),
                self.clock.now(),
            );
            backend.messages.push(message.clone());
            message
        };

        self.push(FeedSignal::Insert(message.clone())).await;
        Ok(message)
    }

    async fn delete_expired(&self, now: Timestamp) -> ClientResult<u64> {
        let removed: Vec<MessageId> = {
            let mut backend = self.backend.lock().unwrap();
            backend.cleanup_passes += 1;
            if backend.fail_cleanup {
                return Err(Self::unavailable());
            }
            let (expired, live): (Vec<Message>, Vec<Message>) = backend
                .messages
                .drain(..)
                .partition(|message| is_expired(message.expires_at, now));
            backend.messages = live;
            expired.into_iter().map(|message| message.id).collect()
        };

        let count = removed.len() as u64;
        for id in removed {
            self.push(FeedSignal::Delete(id)).await;
        }
        Ok(count)
    }

    async fn delete_inactive_users(&self, cutoff: Timestamp) -> ClientResult<u64> {
        let mut backend = self.backend.lock().unwrap();
        if backend.fail_cleanup {
            return Err(Self::unavailable());
        }
        let before = backend.users.len();
        backend
            .users
            .retain(|user| user.is_op || user.last_active >= cutoff);
        Ok((before - backend.users.len()) as u64)
    }

    async fn touch_presence(&self, user_id: Uuid) -> ClientResult<()> {
        let now = self.clock.now();
        let mut backend = self.backend.lock().unwrap();
        backend.touches.push(user_id);
        if let Some(user) = backend.users.iter_mut().find(|user| user.id == user_id) {
            user.last_active = now;
        }
        Ok(())
    }

    async fn online_count(&self, since: Timestamp) -> ClientResult<u64> {
        let backend = self.backend.lock().unwrap();
        Ok(backend
            .users
            .iter()
            .filter(|user| user.last_active >= since)
            .count() as u64)
    }

    async fn subscribe(&self) -> ClientResult<FeedChannel> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        let mode = *self.mode.lock().unwrap();

        match mode {
            FeedMode::Accept => {
                tx.try_send(FeedSignal::Status(ChannelStatus::Subscribed))
                    .expect("fresh channel has capacity");
                let keep_alive = tx.clone();
                tokio::spawn(async move {
                    loop {
                        sleep(KEEP_ALIVE).await;
                        if keep_alive.send(FeedSignal::Alive).await.is_err() {
                            break;
                        }
                    }
                });
                self.backend.lock().unwrap().feeds.push(tx);
            }
            FeedMode::Mute => {
                tx.try_send(FeedSignal::Status(ChannelStatus::Subscribed))
                    .expect("fresh channel has capacity");
                self.backend.lock().unwrap().silent.push(tx);
            }
            FeedMode::Reject => {
                tx.try_send(FeedSignal::Status(ChannelStatus::ChannelError))
                    .expect("fresh channel has capacity");
            }
            FeedMode::Silent => {
                self.backend.lock().unwrap().silent.push(tx);
            }
        }

        Ok(FeedChannel::new(rx, CancellationToken::new()))
    }
}

/// Waits until the view satisfies `predicate`, failing after a minute of virtual time.
pub async fn wait_for_view(handle: &SessionHandle, predicate: impl Fn(&[Message]) -> bool) {
    let mut view = handle.watch_messages();
    loop {
        if predicate(&view.borrow_and_update()) {
            return;
        }
        timeout(Duration::from_secs(60), view.changed())
            .await
            .expect("view did not change in time")
            .expect("session stopped");
    }
}

/// Waits until the subscription reaches `wanted`.
pub async fn wait_for_state(handle: &SessionHandle, wanted: SubscriptionState) {
    let mut state: watch::Receiver<SubscriptionState> = handle.watch_subscription();
    loop {
        if *state.borrow_and_update() == wanted {
            return;
        }
        timeout(Duration::from_secs(120), state.changed())
            .await
            .expect("subscription state did not change in time")
            .expect("subscription stopped");
    }
}

pub fn lifetime_plus(secs: i64) -> TimeDelta {
    TimeDelta::hours(24) + TimeDelta::seconds(secs)
}
