//! Error types for snapshots and rollback.

use thiserror::Error;

use vigil_core::{AdapterError, DeployTarget, RollbackResult};
use vigil_state::StateError;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read current {target} version: {source}")]
    Version {
        target: DeployTarget,
        #[source]
        source: AdapterError,
    },

    #[error("database backup failed: {0}")]
    Backup(#[source] AdapterError),

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum RollbackError {
    /// Verification budget spent without every target reporting healthy.
    /// Carries the per-service results of the rollback steps.
    #[error("services did not stabilize after {attempts} health checks; manual intervention required")]
    DidNotStabilize {
        attempts: u32,
        results: Vec<RollbackResult>,
    },

    #[error(transparent)]
    State(#[from] StateError),
}
