//! vigil-metrics: observability for the Vigil control plane.
//!
//! Counts recovery sequences and rollbacks as they finish and renders them,
//! together with the latest probe results, in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── record_recovery() ← called by the recovery orchestrator
//!   ├── record_rollback() ← called by the rollback coordinator
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{
    MetricsCollector, MetricsSnapshot, RecoveryCounters, RollbackCounters, ServiceRollbackCounters,
};
pub use prometheus::render_prometheus;
