// Signaling rendezvous service: the HTTP surface hosts and players poll to
// exchange offers, answers and address candidates for a room.

pub mod error;
pub mod handlers;
pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use tokio::sync::oneshot;
use tracing::{error, info};

use session_store::SessionStore;

pub use error::SignalingError;
pub use rate_limit::RateLimiter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const HEALTHZ_PATH: &str = "/healthz";
pub const VERSION_PATH: &str = "/version";
pub const METRICS_PATH: &str = "/metrics";

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "signaling_http_requests_total",
        "HTTP requests per route",
        &["path"]
    )
    .expect("register signaling_http_requests_total")
});

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SignalingSettings {
    pub bind_addr: SocketAddr,
    pub rate_limit: u32,
    pub rate_window_secs: u64,
}

impl SignalingSettings {
    pub fn from_env() -> Result<Self, BoxError> {
        let bind_addr: SocketAddr = std::env::var("SIGNALING_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|e| Box::new(e) as BoxError)?;
        let rate_limit = std::env::var("SIGNALING_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        let rate_window_secs = std::env::var("SIGNALING_RATE_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        Ok(Self {
            bind_addr,
            rate_limit,
            rate_window_secs,
        })
    }
}

#[derive(Debug)]
pub struct SignalingConfig {
    pub bind_addr: SocketAddr,
    pub rate_limit: u32,
    pub rate_window_secs: u64,
    pub ready_tx: Option<oneshot::Sender<SocketAddr>>,
}

impl SignalingConfig {
    pub fn from_settings(settings: SignalingSettings) -> Self {
        Self {
            bind_addr: settings.bind_addr,
            rate_limit: settings.rate_limit,
            rate_window_secs: settings.rate_window_secs,
            ready_tx: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub limiter: Arc<RateLimiter>,
}

async fn track_requests(request: Request, next: Next) -> axum::response::Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    HTTP_REQUESTS_TOTAL.with_label_values(&[&path]).inc();
    next.run(request).await
}

/// 429 guard in front of the session routes; scope is method + route
/// pattern so polling one endpoint cannot starve another.
async fn guard_rate_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<axum::response::Response, SignalingError> {
    let scope = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| format!("{} {}", request.method(), matched.as_str()))
        .unwrap_or_else(|| request.method().to_string());
    let client = rate_limit::client_ip(&headers);
    if state.limiter.is_limited(&scope, &client) {
        return Err(SignalingError::RateLimited);
    }
    Ok(next.run(request).await)
}

pub fn build_router(store: Arc<dyn SessionStore>, limiter: Arc<RateLimiter>) -> Router {
    let state = AppState { store, limiter };

    let session_routes = Router::new()
        .route("/create", post(handlers::create_session))
        .route("/:room_id", get(handlers::get_session))
        .route(
            "/:room_id/offer",
            post(handlers::post_offer).get(handlers::get_offer),
        )
        .route(
            "/:room_id/answer",
            post(handlers::post_answer).get(handlers::get_answer),
        )
        .route(
            "/:room_id/candidate",
            post(handlers::post_candidate).get(handlers::get_candidate),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard_rate_limit,
        ));

    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(VERSION_PATH, get(version))
        .route(METRICS_PATH, get(metrics))
        .nest("/session", session_routes)
        .layer(middleware::from_fn(track_requests))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    axum::http::StatusCode::OK
}

async fn version() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "signaling",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics() -> impl IntoResponse {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(%err, "metrics encode failed");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "metrics encode failed",
        )
            .into_response();
    }
    let body = String::from_utf8(buffer).unwrap_or_default();
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type())],
        body,
    )
        .into_response()
}

/// Serve the signaling surface until shutdown is triggered.
pub async fn run(
    config: SignalingConfig,
    store: Arc<dyn SessionStore>,
    shutdown_rx: common::shutdown::ShutdownReceiver,
) -> Result<(), BoxError> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| Box::new(e) as BoxError)?;
    let local_addr = listener.local_addr().map_err(|e| Box::new(e) as BoxError)?;
    if let Some(tx) = config.ready_tx {
        let _ = tx.send(local_addr);
    }

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit,
        Duration::from_secs(config.rate_window_secs),
    ));
    let app = build_router(store, limiter);

    info!(%local_addr, "signaling listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(common::shutdown::wait(shutdown_rx))
        .await
        .map_err(|e| Box::new(e) as BoxError)?;
    Ok(())
}
