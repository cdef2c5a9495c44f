//! Server-sent change feed.
//!
//! Every connection is acknowledged with a `subscribed` event, then receives
//! one `message.insert` or `message.delete` per row change. Keep-alives are
//! `ping` events so clients can tell a quiet feed from a dead one.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures_util::Stream;
use metrics::counter;
use shared::models::ChangeEvent;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{info, warn};

use crate::app_state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/stream/messages", get(message_stream))
}

fn to_sse(event: &ChangeEvent) -> Option<Result<Event, Infallible>> {
    match event.data() {
        Ok(data) => Some(Ok(Event::default().event(event.event_name()).data(data))),
        Err(err) => {
            warn!(event = event.event_name(), error = %err, "dropping unserialisable change");
            None
        }
    }
}

fn ping() -> Event {
    Event::default()
        .event(ChangeEvent::Ping.event_name())
        .data("{}")
}

async fn message_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.feed.subscribe();
    counter!("ephemera_feed_connections_total").increment(1);
    info!(
        subscribers = state.feed.subscriber_count(),
        "change feed subscriber connected"
    );

    let changes = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => to_sse(&event),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "change feed subscriber lagged; reconciliation will repair");
            None
        }
    });
    let stream = tokio_stream::iter(to_sse(&ChangeEvent::Subscribed)).chain(changes);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).event(ping()))
}
