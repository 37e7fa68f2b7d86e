//! Contracts for the external collaborators the control plane drives.
//!
//! The orchestration logic (ordering, retries, verification) only ever
//! sees these traits; concrete implementations are injected at startup.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Alert, AuditRecord, VersionDescriptor};

/// Result type alias for control-plane adapter calls.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors raised by control-plane adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The provider cannot perform this operation (callers may fall back).
    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("command `{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("invalid adapter output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Compute orchestration (container services running the backend).
#[async_trait]
pub trait ComputeAdapter: Send + Sync {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor>;

    async fn deploy(&self, version: &VersionDescriptor) -> AdapterResult<()>;

    /// Block until the provider reports the service stable.
    async fn wait_stable(&self) -> AdapterResult<()>;
}

/// Static-site hosting (the frontend).
#[async_trait]
pub trait StaticSiteAdapter: Send + Sync {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor>;

    /// Native rollback. Providers without one return `Unsupported`.
    async fn rollback_to(&self, version: &VersionDescriptor) -> AdapterResult<()>;

    /// Promote an earlier deployment to production.
    async fn promote(&self, version: &VersionDescriptor) -> AdapterResult<()>;
}

/// Database backup and restore.
#[async_trait]
pub trait DatabaseBackupAdapter: Send + Sync {
    /// Current schema state (migration id).
    async fn current_version(&self) -> AdapterResult<VersionDescriptor>;

    /// Take a full data backup keyed by `id`; returns the backup reference.
    async fn backup(&self, id: &str) -> AdapterResult<String>;

    async fn restore(&self, backup_ref: &str) -> AdapterResult<()>;

    /// Bring the migration tool's bookkeeping in line with restored data.
    async fn reconcile_schema(&self) -> AdapterResult<()>;
}

/// Outbound alert delivery. Best-effort: callers log failures and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()>;
}
