//! HTTP handlers

use super::types::{ErrorResponse, HealthResponse, QueryRequest};
use super::AppState;
use crate::actions::ActionRequest;
use crate::error::Error;
use crate::metrics::gather_metrics;
use crate::query::TsdbQuery;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Map a crate error onto an HTTP error response
fn error_response(e: &Error) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            message: e.to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// Health & Metrics
// =============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, [("content-type", "text/plain")], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

// =============================================================================
// Query & Action Handlers
// =============================================================================

/// Execute a batch of dashboard queries
///
/// Per-query failures come back inside the per-refId results; only a bad
/// request window fails the whole call.
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Response {
    let time_range = match req.time_range() {
        Ok(range) => range,
        Err(e) => {
            warn!(error = %e, "Rejected query batch");
            return error_response(&e);
        }
    };
    debug!(queries = req.queries.len(), range = %time_range, "Executing query batch");

    let response = state
        .executor
        .execute(&TsdbQuery {
            time_range,
            queries: req.queries,
        })
        .await;
    Json(response).into_response()
}

/// Handle a datasource action
pub async fn action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionRequest>,
) -> Response {
    match state.dispatcher.dispatch(&req).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            warn!(action = %req.action, error = %e, "Action failed");
            error_response(&e)
        }
    }
}
