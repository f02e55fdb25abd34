//! Web server module.
//!
//! This module exposes:
//! - `POST /webhook`: signed message ingestion
//! - `GET /messages`: filtered, paginated message listing
//! - `GET /stats`: summary statistics
//! - `GET /health/live`, `GET /health/ready`: probes
//! - `GET /metrics`: request counters

pub mod handlers;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health_live, health_ready, list_messages, metrics, stats, webhook, AppState, ErrorResponse,
    HealthResponse, ListParams, MessagesResponse, WebhookResponse,
};
pub use middleware::{track_requests, REQUEST_ID_HEADER};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/messages", get(list_messages))
        .route("/stats", get(stats))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
