use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use shared::models::{
    Author, ChangeEvent, CreateMessageRequest, DeletedCount, DeletedMessage, ListMessagesResponse,
    Timestamp, validate_content,
};
use tracing::{info, instrument};

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages", get(list_messages).post(create_message))
        .route("/api/messages/expired", delete(delete_expired))
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct BeforeQuery {
    pub(crate) before: Option<DateTime<Utc>>,
}

#[instrument(skip(state))]
async fn list_messages(State(state): State<Arc<AppState>>) -> AppResult<Json<ListMessagesResponse>> {
    let messages = state.repository.list_live(Timestamp::now()).await?;
    Ok(Json(ListMessagesResponse { messages }))
}

#[instrument(skip(state, payload))]
async fn create_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let content = validate_content(&payload.content)?;
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username must not be empty"));
    }
    let author = Author {
        id: payload.user_id,
        username: username.to_string(),
    };

    let message = state
        .repository
        .insert_message(&author, &content, Timestamp::now())
        .await?;

    counter!("ephemera_messages_inserted_total").increment(1);
    state.feed.publish(ChangeEvent::Insert(message.clone()));

    Ok((StatusCode::CREATED, Json(message)))
}

/// Purges rows expired as of `before` (default: now) and announces each one.
#[instrument(skip(state))]
async fn delete_expired(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BeforeQuery>,
) -> AppResult<Json<DeletedCount>> {
    let before = query.before.map_or_else(Timestamp::now, Timestamp);
    let removed = state.repository.delete_expired(before).await?;

    let deleted = removed.len() as u64;
    for id in removed {
        state.feed.publish(ChangeEvent::Delete(DeletedMessage { id }));
    }
    counter!("ephemera_messages_expired_total").increment(deleted);
    if deleted > 0 {
        info!(deleted, "expired messages purged");
    }

    Ok(Json(DeletedCount { deleted }))
}
