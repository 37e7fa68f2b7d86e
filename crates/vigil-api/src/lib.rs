//! vigil-api: operator REST API for Vigil.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/health` | Aggregate system health (503 when unhealthy) |
//! | GET | `/api/v1/health/{service}` | One service's health |
//! | DELETE | `/api/v1/health/cache` | Clear the probe cache |
//! | POST | `/api/v1/recover` | Recover every unhealthy service |
//! | POST | `/api/v1/recover/{service}` | Recover one service |
//! | GET | `/api/v1/recover/history` | Recovery audit records |
//! | GET | `/api/v1/snapshots` | List snapshots |
//! | POST | `/api/v1/snapshots` | Capture a snapshot |
//! | GET | `/api/v1/snapshots/{id}` | Get one snapshot |
//! | POST | `/api/v1/rollback` | Roll back to a snapshot |
//! | GET | `/api/v1/rollback/history` | Rollback audit records |
//! | GET | `/api/v1/rollback/status` | Current rollback phase |
//! | GET | `/healthz` | Liveness |
//! | GET | `/readyz` | Readiness over critical probes |
//! | GET | `/metrics` | Prometheus text exposition |

pub mod handlers;
pub mod rollback_handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};

use vigil_health::HealthEngine;
use vigil_metrics::MetricsCollector;
use vigil_recovery::RecoveryOrchestrator;
use vigil_rollback::{RollbackCoordinator, SnapshotManager};
use vigil_state::FileStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub health: Arc<HealthEngine>,
    pub recovery: Arc<RecoveryOrchestrator>,
    pub snapshots: Arc<SnapshotManager>,
    pub rollback: Arc<RollbackCoordinator>,
    pub store: FileStore,
    pub metrics: Arc<MetricsCollector>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::system_health))
        .route("/health/cache", delete(handlers::clear_health_cache))
        .route("/health/{service}", get(handlers::service_health))
        .route("/recover", post(handlers::recover_failed))
        .route("/recover/history", get(handlers::recovery_history))
        .route("/recover/{service}", post(handlers::recover_service))
        .route(
            "/snapshots",
            get(rollback_handlers::list_snapshots).post(rollback_handlers::create_snapshot),
        )
        .route("/snapshots/{id}", get(rollback_handlers::get_snapshot))
        .route("/rollback", post(rollback_handlers::start_rollback))
        .route("/rollback/history", get(rollback_handlers::rollback_history))
        .route("/rollback/status", get(rollback_handlers::rollback_status))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::liveness))
        .route("/readyz", get(handlers::readiness).with_state(state.clone()))
        .route(
            "/metrics",
            get(handlers::prometheus_metrics).with_state(state),
        )
}
