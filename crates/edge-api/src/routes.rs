//! API routes.

use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use edge_data::{HealthStatus, SlowMessage};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::{panic_response, EndpointError};

/// Default artificial latency of `/slow`.
pub const DEFAULT_SLOW_DELAY: Duration = Duration::from_millis(2000);

/// Settings shared by the API handlers.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// How long `/slow` waits before answering.
    pub slow_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            slow_delay: DEFAULT_SLOW_DELAY,
        }
    }
}

/// The API endpoints, relative to their mount point.
///
/// Handlers hold no shared mutable state, so any number of requests may be in
/// flight at once.
pub fn router(config: ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slow", get(slow))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .with_state(config)
}

/// Convert handler panics into `500 {"error":"internal server error"}`.
pub fn with_error_policy(router: Router) -> Router {
    router.layer(CatchPanicLayer::custom(panic_response))
}

/// The API with its error policy, nested under `prefix`.
pub fn mount(prefix: &str, config: ApiConfig) -> Router {
    Router::new().nest(prefix, with_error_policy(router(config)))
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::ok())
}

async fn slow(State(config): State<ApiConfig>) -> Json<SlowMessage> {
    tokio::time::sleep(config.slow_delay).await;
    Json(SlowMessage::ok())
}

async fn not_found() -> EndpointError {
    EndpointError::NotFound
}

async fn method_not_allowed() -> EndpointError {
    EndpointError::MethodNotAllowed
}
