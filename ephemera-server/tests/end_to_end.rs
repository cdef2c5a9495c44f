//! The sync engine against a real server bound to a loopback port.

use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use client::{
    ChatSession, Clock, HttpRemoteStore, RemoteStore, SessionHandle, SubscriptionState,
    SystemClock, presence,
};
use server::{InMemoryChatRepository, serve_on};
use shared::{
    config::{client::ClientConfig, server::ServerConfig},
    models::{Message, Timestamp},
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::timeout};
use url::Url;

struct TestServer {
    url: Url,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            serve_on(
                listener,
                Arc::new(InMemoryChatRepository::new()),
                &ServerConfig::default(),
                async {
                    let _ = signal.await;
                },
            )
            .await
            .unwrap();
        });

        Self {
            url: Url::parse(&format!("http://{addr}/")).unwrap(),
            shutdown: Some(shutdown),
            task,
        }
    }

    fn store(&self) -> Arc<HttpRemoteStore> {
        Arc::new(HttpRemoteStore::new(&self.url).unwrap())
    }

    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = timeout(Duration::from_secs(5), self.task).await;
    }
}

async fn join(server: &TestServer, name: &str) -> ChatSession {
    let store = server.store();
    let user = store.register_user(name).await.unwrap();
    let mut config = ClientConfig::default();
    config.server_url = server.url.clone();

    ChatSession::start(
        store as Arc<dyn RemoteStore>,
        Arc::new(SystemClock) as Arc<dyn Clock>,
        user.author(),
        &config,
    )
}

async fn wait_for(handle: &SessionHandle, predicate: impl Fn(&[Message]) -> bool) {
    let mut view = handle.watch_messages();
    timeout(Duration::from_secs(10), async {
        loop {
            if predicate(&view.borrow_and_update()) {
                return;
            }
            view.changed().await.unwrap();
        }
    })
    .await
    .expect("view did not reach the expected state");
}

async fn subscribed(handle: &SessionHandle) {
    let mut state = handle.watch_subscription();
    timeout(Duration::from_secs(10), async {
        while *state.borrow_and_update() != SubscriptionState::Subscribed {
            state.changed().await.unwrap();
        }
    })
    .await
    .expect("subscription did not come up");
}

#[tokio::test]
async fn messages_flow_between_sessions() {
    let server = TestServer::start().await;
    let alice = join(&server, "alice").await;
    let bob = join(&server, "bob").await;
    subscribed(&alice.handle()).await;
    subscribed(&bob.handle()).await;

    let provisional = alice.handle().send("hello bob").await.unwrap();
    assert!(provisional.is_provisional());

    wait_for(&bob.handle(), |view| {
        view.iter().any(|m| m.content == "hello bob" && !m.is_provisional())
    })
    .await;
    wait_for(&alice.handle(), |view| {
        view.len() == 1 && !view[0].is_provisional()
    })
    .await;

    assert_eq!(alice.handle().messages(), bob.handle().messages());

    alice.stop().await;
    bob.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn purged_messages_disappear_from_connected_views() {
    let server = TestServer::start().await;
    let alice = join(&server, "alice").await;
    subscribed(&alice.handle()).await;

    alice.handle().send("short lived").await.unwrap();
    wait_for(&alice.handle(), |view| {
        view.len() == 1 && !view[0].is_provisional()
    })
    .await;

    let store = server.store();
    let tomorrow = Timestamp(Utc::now() + TimeDelta::hours(25));
    assert_eq!(store.delete_expired(tomorrow).await.unwrap(), 1);

    wait_for(&alice.handle(), <[_]>::is_empty).await;

    alice.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn presence_and_identity_cleanup_round_trip() {
    let server = TestServer::start().await;
    let store = server.store();

    let alice = store.register_user("alice").await.unwrap();
    store.register_user("bob").await.unwrap();
    store.touch_presence(alice.id).await.unwrap();

    let online = presence::online_count(store.as_ref(), &SystemClock)
        .await
        .unwrap();
    assert_eq!(online, 2);

    let future_cutoff = Timestamp(Utc::now() + TimeDelta::minutes(1));
    assert_eq!(store.delete_inactive_users(future_cutoff).await.unwrap(), 2);
    assert_eq!(
        store
            .online_count(Timestamp(Utc::now() - TimeDelta::minutes(5)))
            .await
            .unwrap(),
        0
    );

    server.stop().await;
}

#[tokio::test]
async fn rejected_content_surfaces_the_problem_code() {
    let server = TestServer::start().await;
    let store = server.store();
    let user = store.register_user("alice").await.unwrap();

    let err = store
        .insert(&shared::models::CreateMessageRequest {
            user_id: user.id,
            username: user.username,
            content: "x".repeat(2001),
        })
        .await
        .unwrap_err();

    match err {
        client::ClientError::Status { status, problem } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(problem.code.as_deref(), Some("validation_failed"));
        }
        other => panic!("unexpected error: {other}"),
    }

    server.stop().await;
}
