//! Health, pool status and recovery endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use engine_orchestrator::SlotStatus;
use serde::Serialize;

use crate::AppState;

/// Health check endpoint.
///
/// Returns "ok" while at least one engine slot accepts requests, otherwise
/// `503 degraded`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.service.supervisor().is_degraded() {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    }
}

/// Pool overview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub degraded: bool,
    /// Requests waiting across all slots.
    pub queued: usize,
    pub slots: Vec<SlotStatus>,
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let supervisor = state.service.supervisor();
    Json(StatusResponse {
        degraded: supervisor.is_degraded(),
        queued: supervisor.queued(),
        slots: supervisor.status(),
    })
}

#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    /// Degraded slots woken for an immediate restart.
    pub recovering: usize,
}

/// POST /api/engine/recover
///
/// Restarts degraded slots now instead of waiting for the recovery interval.
pub async fn recover(State(state): State<AppState>) -> Json<RecoverResponse> {
    let recovering = state.service.supervisor().recover();
    tracing::info!(recovering, "Recovery requested over HTTP");
    Json(RecoverResponse { recovering })
}
