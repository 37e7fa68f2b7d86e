//! vigil-rollback: deployment snapshots and snapshot-based rollback.
//!
//! # Components
//!
//! - **`control`**: the three control-plane adapters bundled together
//! - **`snapshot`**: captures versions, health and a database backup
//! - **`coordinator`**: selects a snapshot, reverts services in fixed
//!   order (backend, frontend, database) and polls health until stable
//!
//! Per-service failures are reported in `RollbackResult`s. The only error
//! a rollback returns is [`RollbackError::DidNotStabilize`] (or a store
//! failure).

pub mod control;
pub mod coordinator;
pub mod error;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use control::ControlPlane;
pub use coordinator::{NO_VALID_SNAPSHOT, RollbackCoordinator, RollbackPhase, RollbackPolicy};
pub use error::{RollbackError, SnapshotError, SnapshotResult};
pub use snapshot::SnapshotManager;
