//! REST API handlers for snapshots and rollback.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use vigil_core::RollbackConfig;
use vigil_rollback::{RollbackError, SnapshotError};
use vigil_state::StateError;

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response};

// ── Snapshots ──────────────────────────────────────────────────

/// GET /api/v1/snapshots
pub async fn list_snapshots(State(state): State<ApiState>) -> impl IntoResponse {
    match state.snapshots.list() {
        Ok(snapshots) => ApiResponse::ok(snapshots).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/snapshots
pub async fn create_snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    match state.snapshots.create_snapshot().await {
        Ok(snapshot) => (StatusCode::CREATED, ApiResponse::ok(snapshot)).into_response(),
        Err(e) => {
            warn!(error = %e, "snapshot capture failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// GET /api/v1/snapshots/{id}
pub async fn get_snapshot(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.snapshots.get(&id) {
        Ok(Some(snapshot)) => ApiResponse::ok(snapshot).into_response(),
        Ok(None) => error_response("snapshot not found", StatusCode::NOT_FOUND).into_response(),
        Err(e @ SnapshotError::State(StateError::InvalidId(_))) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Rollback ───────────────────────────────────────────────────

/// POST /api/v1/rollback
pub async fn start_rollback(
    State(state): State<ApiState>,
    Json(config): Json<RollbackConfig>,
) -> impl IntoResponse {
    match state.rollback.rollback(config).await {
        Ok(results) => ApiResponse::ok(results).into_response(),
        Err(e) => {
            let message = e.to_string();
            match e {
                RollbackError::DidNotStabilize { results, .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::failed(results, message),
                )
                    .into_response(),
                RollbackError::State(_) => {
                    error_response(&message, StatusCode::INTERNAL_SERVER_ERROR).into_response()
                }
            }
        }
    }
}

/// GET /api/v1/rollback/history
pub async fn rollback_history(State(state): State<ApiState>) -> impl IntoResponse {
    match state.rollback.history() {
        Ok(history) => ApiResponse::ok(history).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/rollback/status
pub async fn rollback_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.rollback.phase())
}
