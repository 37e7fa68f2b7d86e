//! vigil-core: shared model for the Vigil control plane.
//!
//! Holds the domain types exchanged between the health engine, the
//! recovery orchestrator and the rollback coordinator, the async adapter
//! contracts for external control planes, and the `vigil.toml` parser.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod duration;
pub mod types;

pub use adapters::{
    AdapterError, AdapterResult, AuditLog, ComputeAdapter, DatabaseBackupAdapter,
    NotificationSink, StaticSiteAdapter,
};
pub use clock::{epoch_millis, next_id};
pub use config::{ConfigError, VigilConfig};
pub use duration::parse_duration;
pub use types::*;
