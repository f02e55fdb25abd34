//! HTTP endpoint handlers.
//!
//! The webhook handler only translates between HTTP and the ingestion
//! pipeline; the read handlers validate query parameters and hand off to the
//! store.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::ingest::{IngestError, Ingestor, SIGNATURE_HEADER};
use crate::metrics::Metrics;
use crate::store::{
    InsertOutcome, MessageFilter, MessageStore, Pagination, StoredMessage, DEFAULT_PAGE_LIMIT,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: MessageStore,
    pub ingestor: Ingestor,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(store: MessageStore, webhook_secret: &str, metrics: Arc<Metrics>) -> Self {
        Self {
            ingestor: Ingestor::new(webhook_secret, store.clone()),
            store,
            metrics,
        }
    }
}

/// Error body shared by every rejection.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

fn reject(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Health Checks
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness endpoint.
pub async fn health_live() -> Json<HealthResponse> {
    Json(HealthResponse { status: "alive" })
}

/// Readiness endpoint. Not ready while the database cannot be reached.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ready" })),
        Err(e) => {
            warn!(error = %e, "readiness_check_failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready",
                }),
            )
        }
    }
}

// =============================================================================
// Webhook
// =============================================================================

/// Webhook response.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// Webhook endpoint.
///
/// Both a fresh insert and a duplicate delivery answer 200 so senders do not
/// treat retries as failures.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    state.metrics.webhook_requests_total.inc();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "webhook_received"
    );

    match state.ingestor.ingest(&body, signature).await {
        Ok(outcome) => {
            if outcome == InsertOutcome::Duplicate {
                state.metrics.webhook_duplicates_total.inc();
            }
            (StatusCode::OK, Json(WebhookResponse { status: "ok" })).into_response()
        }
        Err(e) if e.is_unauthenticated() => {
            state.metrics.webhook_rejected_total.inc();
            reject(StatusCode::UNAUTHORIZED, "invalid signature")
        }
        Err(IngestError::InvalidPayload(_)) => {
            state.metrics.webhook_rejected_total.inc();
            reject(StatusCode::UNPROCESSABLE_ENTITY, "invalid payload")
        }
        Err(_) => {
            state.metrics.webhook_storage_errors_total.inc();
            reject(StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Query string accepted by `GET /messages`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub start_ts: Option<String>,
    pub end_ts: Option<String>,
}

/// One page of messages.
#[derive(Serialize)]
pub struct MessagesResponse {
    pub data: Vec<StoredMessage>,
    pub total: u64,
    pub limit: i64,
    pub offset: i64,
}

/// List stored messages, newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "messages_query_rejected");
            return reject(StatusCode::UNPROCESSABLE_ENTITY, e.body_text());
        }
    };

    let page = match Pagination::new(
        params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        params.offset.unwrap_or(0),
    ) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "messages_query_rejected");
            return reject(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
        }
    };

    let filter = match MessageFilter::from_params(
        params.from.as_deref(),
        params.to.as_deref(),
        params.start_ts.as_deref(),
        params.end_ts.as_deref(),
    ) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "messages_query_rejected");
            return reject(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
        }
    };

    match state.store.query(&filter, page).await {
        Ok(result) => Json(MessagesResponse {
            data: result.rows,
            total: result.total,
            limit: page.limit(),
            offset: page.offset(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "messages_query_failed");
            reject(StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}

// =============================================================================
// Stats and Metrics
// =============================================================================

/// Summary statistics endpoint.
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.store.compute_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!(error = %e, "stats_query_failed");
            reject(StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}

/// Prometheus text exposition of the request counters.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "metrics_render_failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
        }
    }
}
