//! Route table.

use crate::handlers::{get_text, health_check, render_metrics};
use crate::state::AppState;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// | Route          | Handler                |
/// |----------------|------------------------|
/// | `GET /text`    | request/reply          |
/// | `GET /health`  | liveness               |
/// | `GET /metrics` | Prometheus scrape      |
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/text", get(get_text))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router serving only `GET /metrics`, for a dedicated scrape port.
pub fn metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(state)
}
