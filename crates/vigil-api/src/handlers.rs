//! REST API handlers for health and recovery.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use vigil_core::HealthStatus;
use vigil_health::HealthError;
use vigil_metrics::render_prometheus;
use vigil_recovery::ALREADY_IN_PROGRESS;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    /// A failure that still carries a payload.
    pub(crate) fn failed(data: T, error: String) -> Json<Self> {
        Json(Self {
            success: false,
            data: Some(data),
            error: Some(error),
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Health ─────────────────────────────────────────────────────

/// GET /api/v1/health
pub async fn system_health(State(state): State<ApiState>) -> impl IntoResponse {
    let health = state.health.check_health().await;
    if health.status == HealthStatus::Unhealthy {
        let failing = health.unhealthy_services().join(", ");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            ApiResponse::failed(health, format!("unhealthy services: {failing}")),
        )
            .into_response()
    } else {
        ApiResponse::ok(health).into_response()
    }
}

/// GET /api/v1/health/{service}
pub async fn service_health(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> impl IntoResponse {
    match state.health.check_service(&service).await {
        Ok(result) => ApiResponse::ok(result).into_response(),
        Err(e @ HealthError::UnknownService(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/health/cache
pub async fn clear_health_cache(State(state): State<ApiState>) -> impl IntoResponse {
    state.health.clear_cache();
    ApiResponse::ok("cleared")
}

/// GET /healthz
pub async fn liveness() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "ok" }))
}

/// GET /readyz
pub async fn readiness(State(state): State<ApiState>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    if readiness.ready {
        ApiResponse::ok(readiness).into_response()
    } else {
        let failing = readiness.failing.join(", ");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            ApiResponse::failed(readiness, format!("critical services failing: {failing}")),
        )
            .into_response()
    }
}

// ── Recovery ───────────────────────────────────────────────────

/// GET /metrics: Prometheus text exposition format.
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let health = state.health.check_health().await;
    let body = render_prometheus(&health, &state.metrics.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// POST /api/v1/recover
pub async fn recover_failed(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.recovery.recover_failed_services().await)
}

/// POST /api/v1/recover/{service}
pub async fn recover_service(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> impl IntoResponse {
    let result = state.recovery.recover_specific_service(&service).await;
    if result.error.as_deref() == Some(ALREADY_IN_PROGRESS) {
        return (
            StatusCode::CONFLICT,
            ApiResponse::failed(result, ALREADY_IN_PROGRESS.to_string()),
        )
            .into_response();
    }
    ApiResponse::ok(result).into_response()
}

/// GET /api/v1/recover/history
pub async fn recovery_history(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.recovery_history() {
        Ok(history) => ApiResponse::ok(history).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
