use std::{
    future::Future,
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::{
    config::server::{CorsConfig, DatabaseConfig, ServerConfig},
    telemetry::{LogTarget, initialize_tracing},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    db::bootstrap,
    handlers,
    middleware::request_context,
    routes,
    services::{ChangeFeed, ChatRepository, InMemoryChatRepository, PgChatRepository},
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Where the server keeps its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local storage; everything is lost on exit.
    InMemory,
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                warn!("a metrics recorder was already installed; /metrics will be empty");
            }
            handle
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Creates a database connection pool from the given settings.
///
/// # Errors
/// Returns an error if the database cannot be reached.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// CORS for browser clients. An empty origin list allows any origin.
#[must_use]
pub fn create_cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::any());

    if cors.allowed_origins.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        let origins = cors
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Every API route, unlayered.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(handlers::messages::routes())
        .merge(handlers::users::routes())
        .merge(handlers::stream::routes())
}

/// The full application: API, health, metrics and the middleware stack.
pub fn create_app_router(
    state: Arc<AppState>,
    config: &ServerConfig,
    metrics_handle: PrometheusHandle,
) -> Router {
    Router::new()
        .merge(create_api_router())
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(metrics_handle))
        .layer(create_cors_layer(&config.cors))
        .layer(tracer::create_trace_layer())
        .layer(middleware::from_fn(request_context::assign_request_id))
        .with_state(state)
}

/// Resolves when Ctrl-C is received.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

/// Connects the repository for `backend`, bootstrapping Postgres when used.
///
/// # Errors
/// Returns an error if the database is unreachable or bootstrap fails.
pub async fn connect_repository(
    config: &ServerConfig,
    backend: StorageBackend,
) -> anyhow::Result<Arc<dyn ChatRepository>> {
    match backend {
        StorageBackend::InMemory => {
            warn!("using in-memory storage; rows are lost on exit");
            Ok(Arc::new(InMemoryChatRepository::new()))
        }
        StorageBackend::Postgres => {
            let pool = create_database_pool(&config.database)
                .await
                .context("failed to connect to the database")?;
            bootstrap::ensure_liveness(&pool)
                .await
                .context("database liveness check failed")?;
            bootstrap::run(&pool, &config.database)
                .await
                .context("database bootstrap failed")?;
            bootstrap::ensure_readiness(&pool)
                .await
                .context("database is not ready")?;
            Ok(Arc::new(PgChatRepository::new(pool)))
        }
    }
}

/// Serves the application on an already bound listener until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the listener fails.
pub async fn serve_on<F>(
    listener: TcpListener,
    repository: Arc<dyn ChatRepository>,
    config: &ServerConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = Arc::new(AppState::new(repository, ChangeFeed::default()));
    let app = create_app_router(state, config, metrics_handle());

    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }
    serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}

/// Starts the server on the configured port.
///
/// # Errors
/// Returns an error if storage cannot be prepared or the port cannot be bound.
pub async fn run(config: ServerConfig, backend: StorageBackend) -> anyhow::Result<()> {
    initialize_tracing(&config.logging, LogTarget::Stdout);
    info!("Starting server...");

    let repository = connect_repository(&config, backend).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    serve_on(listener, repository, &config, create_shutdown_signal()).await
}
