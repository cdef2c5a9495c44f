use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;
use serde::Deserialize;
use shared::models::{DeletedCount, OnlineResponse, RegisterUserRequest, Timestamp, User};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_state::AppState, handlers::messages::BeforeQuery, http::error::AppResult,
    services::repository::validate_username,
};

/// Window used by `/api/users/online` when the caller gives no `since`.
const DEFAULT_ONLINE_WINDOW: TimeDelta = TimeDelta::minutes(5);
/// Retention used by `/api/users/inactive` when the caller gives no `before`.
const DEFAULT_USER_RETENTION: TimeDelta = TimeDelta::days(7);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", post(register_user))
        .route("/api/users/online", get(online_count))
        .route("/api/users/inactive", delete(delete_inactive))
        .route("/api/users/{id}/heartbeat", post(heartbeat))
}

#[derive(Debug, Deserialize, Default)]
struct SinceQuery {
    since: Option<DateTime<Utc>>,
}

#[instrument(skip(state, payload))]
async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterUserRequest>,
) -> AppResult<Json<User>> {
    let username = validate_username(&payload.username)?;
    let user = state
        .repository
        .register_user(&username, Timestamp::now())
        .await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
async fn heartbeat(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    state.repository.touch_user(id, Timestamp::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn online_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SinceQuery>,
) -> AppResult<Json<OnlineResponse>> {
    let since = query
        .since
        .unwrap_or_else(|| Utc::now() - DEFAULT_ONLINE_WINDOW);
    let online = state.repository.online_count(Timestamp(since)).await?;
    Ok(Json(OnlineResponse { online }))
}

/// Removes non-operator identities idle since before the cutoff.
#[instrument(skip(state))]
async fn delete_inactive(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BeforeQuery>,
) -> AppResult<Json<DeletedCount>> {
    let before = query
        .before
        .unwrap_or_else(|| Utc::now() - DEFAULT_USER_RETENTION);
    let deleted = state
        .repository
        .delete_inactive_users(Timestamp(before))
        .await?;

    counter!("ephemera_users_deleted_total").increment(deleted);
    if deleted > 0 {
        info!(deleted, "inactive users purged");
    }
    Ok(Json(DeletedCount { deleted }))
}
