//! Router fixtures shared by the handler tests.

use std::sync::Arc;

use axum::{body::Body, response::Response};
use http::{Request, header::CONTENT_TYPE};
use serde_json::Value;

use crate::{
    app_state::AppState,
    services::{ChangeFeed, ChatRepository, InMemoryChatRepository},
};

pub(crate) fn test_state() -> (Arc<AppState>, Arc<InMemoryChatRepository>) {
    let repo = Arc::new(InMemoryChatRepository::new());
    let state = Arc::new(AppState::new(
        Arc::clone(&repo) as Arc<dyn ChatRepository>,
        ChangeFeed::new(64),
    ));
    (state, repo)
}

pub(crate) fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
