//! End-to-end behaviour of a chat session against an in-memory remote.

mod common;

use chrono::TimeDelta;
use client::{
    ChatSession, CleanupService, ClientError, Clock, FeedSignal, ManualClock, Notice,
    RemoteStore, SubscriptionState,
};
use common::{FakeRemote, FeedMode, author, lifetime_plus, t0, wait_for_state, wait_for_view};
use shared::{config::client::ClientConfig, models::MessageId};
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep, timeout};

fn start(remote: &Arc<FakeRemote>, clock: &ManualClock, name: &str) -> ChatSession {
    ChatSession::start(
        Arc::clone(remote) as Arc<dyn RemoteStore>,
        Arc::new(clock.clone()) as Arc<dyn Clock>,
        author(name),
        &ClientConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn send_is_visible_immediately_and_confirmed_once() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_state(&handle, SubscriptionState::Subscribed).await;

    let gate = remote.hold_inserts();
    let provisional = handle.send("hello").await.unwrap();

    let view = handle.messages();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, provisional);
    assert!(view[0].is_provisional());
    assert_eq!(view[0].content, "hello");
    assert_eq!(view[0].expires_at.0, t0().0 + TimeDelta::hours(24));

    gate.add_permits(1);
    wait_for_view(&handle, |view| {
        view.len() == 1 && view[0].id == MessageId::new("m1")
    })
    .await;

    let confirmed = handle.messages()[0].clone();
    remote.push(FeedSignal::Insert(confirmed.clone())).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.messages(), vec![confirmed]);
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_send_rolls_back_and_restores_draft() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    remote.fail_inserts(true);
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    let mut notices = handle.notices();

    handle.send("  oops  ").await.unwrap();

    let notice = timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("notice in time")
        .expect("notice channel open");
    match notice {
        Notice::SendFailed { draft, reason } => {
            assert_eq!(draft, "oops");
            assert!(reason.contains("503"));
        }
    }
    wait_for_view(&handle, <[_]>::is_empty).await;
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rejects_invalid_and_concurrent_sends() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();

    assert!(matches!(
        handle.send("   ").await,
        Err(ClientError::Validation(_))
    ));

    let gate = remote.hold_inserts();
    handle.send("first").await.unwrap();
    assert!(matches!(
        handle.send("second").await,
        Err(ClientError::SendInFlight)
    ));
    assert_eq!(handle.messages().len(), 1);

    gate.add_permits(1);
    wait_for_view(&handle, |view| view.iter().all(|m| !m.is_provisional())).await;
    handle.send("second").await.unwrap();

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn feed_inserts_and_deletes_reach_the_view() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_state(&handle, SubscriptionState::Subscribed).await;

    let other = remote.sibling();
    let bob = author("bob");
    let message = other
        .insert(&shared::models::CreateMessageRequest {
            user_id: bob.id,
            username: bob.username.clone(),
            content: "from bob".into(),
        })
        .await
        .unwrap();
    wait_for_view(&handle, |view| view.iter().any(|m| m.id == message.id)).await;

    remote.remove_row(&message.id).await;
    wait_for_view(&handle, <[_]>::is_empty).await;

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn degraded_client_catches_up_through_reconciliation() {
    let clock = ManualClock::new(t0());
    let remote_a = FakeRemote::new(clock.clone());
    let remote_b = remote_a.sibling();
    remote_b.set_feed_mode(FeedMode::Reject);

    let session_b = start(&remote_b, &clock, "bob");
    let handle_b = session_b.handle();
    wait_for_state(&handle_b, SubscriptionState::Degraded).await;
    assert_eq!(remote_b.subscribe_calls(), 4);

    let session_a = start(&remote_a, &clock, "alice");
    let handle_a = session_a.handle();
    wait_for_state(&handle_a, SubscriptionState::Subscribed).await;

    let sent_at = Instant::now();
    handle_a.send("hi").await.unwrap();
    wait_for_view(&handle_b, |view| view.iter().any(|m| m.content == "hi")).await;
    assert!(sent_at.elapsed() <= Duration::from_secs(5));

    sleep(Duration::from_secs(30)).await;
    assert_eq!(remote_b.subscribe_calls(), 4);
    assert_eq!(handle_b.subscription_state(), SubscriptionState::Degraded);

    session_a.stop().await;
    session_b.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_feed_times_out_and_degrades() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    remote.set_feed_mode(FeedMode::Silent);

    let started = Instant::now();
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_state(&handle, SubscriptionState::Degraded).await;

    // Four 10 s connection windows separated by three 2 s timeout backoffs.
    assert!(started.elapsed() >= Duration::from_secs(46));
    assert_eq!(remote.subscribe_calls(), 4);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn expired_messages_leave_the_view_and_the_server() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();

    handle.send("bye").await.unwrap();
    wait_for_view(&handle, |view| {
        view.len() == 1 && !view[0].is_provisional()
    })
    .await;

    clock.advance(lifetime_plus(1));
    let expired_at = Instant::now();
    wait_for_view(&handle, <[_]>::is_empty).await;
    assert!(expired_at.elapsed() <= Duration::from_secs(60));

    let cleanup = CleanupService::new(
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        Arc::new(clock.clone()),
        ClientConfig::default().cleanup,
    );
    let report = cleanup.trigger().await;
    assert_eq!(report.messages_deleted, Some(1));
    assert!(remote.messages().is_empty());

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn initial_fetch_skips_expired_rows() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let bob = author("bob");
    let old = shared::models::Message::new(
        MessageId::new("old"),
        &bob,
        "stale",
        shared::models::Timestamp(t0().0 - lifetime_plus(1)),
    );
    let fresh = shared::models::Message::new(
        MessageId::new("fresh"),
        &bob,
        "new",
        shared::models::Timestamp(t0().0 - TimeDelta::minutes(5)),
    );
    remote.seed(old);
    remote.seed(fresh.clone());

    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_view(&handle, |view| !view.is_empty()).await;

    assert_eq!(handle.messages(), vec![fresh]);
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stopped_session_rejects_sends_and_stops_heartbeats() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();

    sleep(Duration::from_secs(61)).await;
    assert_eq!(remote.touches(), 3);

    session.stop().await;
    assert!(matches!(
        handle.send("late").await,
        Err(ClientError::SessionClosed)
    ));

    sleep(Duration::from_secs(120)).await;
    assert_eq!(remote.touches(), 3);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_session_stops_its_tasks() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_state(&handle, SubscriptionState::Subscribed).await;
    sleep(Duration::from_millis(10)).await;
    assert_eq!(remote.touches(), 1);

    drop(session);
    sleep(Duration::from_secs(300)).await;

    assert_eq!(remote.touches(), 1);
    assert_eq!(remote.subscribe_calls(), 1);
    assert!(matches!(
        handle.send("anyone?").await,
        Err(ClientError::SessionClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn quiet_feed_times_out_and_reconnects() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    remote.set_feed_mode(FeedMode::Mute);
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_state(&handle, SubscriptionState::Subscribed).await;

    // 30 s of silence, then the 2 s timeout backoff.
    sleep(Duration::from_secs(31)).await;
    assert_eq!(handle.subscription_state(), SubscriptionState::Connecting);
    assert_eq!(remote.subscribe_calls(), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(remote.subscribe_calls(), 2);
    assert_eq!(handle.subscription_state(), SubscriptionState::Subscribed);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn keep_alives_hold_an_idle_feed_open() {
    let clock = ManualClock::new(t0());
    let remote = FakeRemote::new(clock.clone());
    let session = start(&remote, &clock, "alice");
    let handle = session.handle();
    wait_for_state(&handle, SubscriptionState::Subscribed).await;

    sleep(Duration::from_secs(3600)).await;

    assert_eq!(remote.subscribe_calls(), 1);
    assert_eq!(handle.subscription_state(), SubscriptionState::Subscribed);
    session.stop().await;
}
