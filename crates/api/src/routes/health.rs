//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use store::Store;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Cancellation tasks waiting in the delay queue, if it answered.
    pub pending_timeouts: Option<usize>,
}

/// GET /health: reports `degraded` when the delay queue is unreachable.
pub async fn check<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.queue.len().await {
        Ok(pending) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                pending_timeouts: Some(pending),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "delay queue health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    pending_timeouts: None,
                }),
            )
        }
    }
}
