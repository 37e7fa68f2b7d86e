//! Domain types for the Vigil control plane.
//!
//! Everything here is JSON-serializable with camelCase field names so the
//! same structures flow through the operator API, the snapshot store and
//! the audit log unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a registered dependency ("database", "cache", "payments", ...).
pub type ServiceName = String;

/// Free-form probe or alert details.
pub type Details = serde_json::Map<String, serde_json::Value>;

// ── Health ─────────────────────────────────────────────────────────

/// Health of a single dependency or of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Outcome of one probe invocation for one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub service: ServiceName,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix epoch milliseconds.
    pub last_checked: u64,
}

impl HealthCheckResult {
    pub fn healthy(service: &str, response_time_ms: u64) -> Self {
        Self {
            service: service.to_string(),
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            details: None,
            error: None,
            last_checked: crate::epoch_millis(),
        }
    }

    pub fn unhealthy(service: &str, error: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            status: HealthStatus::Unhealthy,
            response_time_ms: None,
            details: None,
            error: Some(error.into()),
            last_checked: crate::epoch_millis(),
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }
}

/// Aggregated view over every registered dependency. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub services: Vec<HealthCheckResult>,
    pub timestamp: u64,
    pub version: String,
    pub environment: String,
}

impl SystemHealth {
    /// Build a system view; the overall status is the worst service status.
    pub fn from_results(
        services: Vec<HealthCheckResult>,
        version: &str,
        environment: &str,
    ) -> Self {
        let status = services
            .iter()
            .fold(HealthStatus::Healthy, |acc, r| acc.worst(r.status));
        Self {
            status,
            services,
            timestamp: crate::epoch_millis(),
            version: version.to_string(),
            environment: environment.to_string(),
        }
    }

    /// Look up the result for a service.
    pub fn service(&self, name: &str) -> Option<&HealthCheckResult> {
        self.services.iter().find(|r| r.service == name)
    }

    /// Names of services currently reporting `Unhealthy`.
    pub fn unhealthy_services(&self) -> Vec<ServiceName> {
        self.services
            .iter()
            .filter(|r| r.status == HealthStatus::Unhealthy)
            .map(|r| r.service.clone())
            .collect()
    }

    /// Whether the named service is present and `Healthy`.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.service(name)
            .is_some_and(|r| r.status == HealthStatus::Healthy)
    }
}

// ── Recovery ───────────────────────────────────────────────────────

/// Outcome of one recovery sequence (up to N tries of one action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub service: ServiceName,
    pub recovered: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: u64,
}

impl RecoveryResult {
    /// A result for a sequence that never ran.
    pub fn skipped(service: &str, error: &str) -> Self {
        Self {
            service: service.to_string(),
            recovered: false,
            attempts: 0,
            error: Some(error.to_string()),
            timestamp: crate::epoch_millis(),
        }
    }
}

// ── Deployments ────────────────────────────────────────────────────

/// A deployable service that rollback can revert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeployTarget {
    Backend,
    Frontend,
    Database,
}

impl DeployTarget {
    /// Every target, in rollback order.
    pub const ORDERED: [DeployTarget; 3] = [Self::Backend, Self::Frontend, Self::Database];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which services a rollback request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackScope {
    Backend,
    Frontend,
    Database,
    All,
}

impl RollbackScope {
    /// Targets to roll back, in execution order.
    pub fn targets(self) -> Vec<DeployTarget> {
        match self {
            Self::Backend => vec![DeployTarget::Backend],
            Self::Frontend => vec![DeployTarget::Frontend],
            Self::Database => vec![DeployTarget::Database],
            Self::All => DeployTarget::ORDERED.to_vec(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Database => "database",
            Self::All => "all",
        }
    }
}

impl fmt::Display for RollbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific description of what is deployed for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VersionDescriptor {
    /// Container workload: task definition plus optional image tag.
    Compute {
        task_definition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    /// Static-site deployment.
    StaticSite {
        deployment_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Database schema state plus the backup taken alongside it.
    Database {
        migration_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backup_ref: Option<String>,
    },
}

impl VersionDescriptor {
    /// Short human-readable version label.
    pub fn label(&self) -> String {
        match self {
            Self::Compute {
                task_definition,
                image: Some(image),
            } => format!("{task_definition} ({image})"),
            Self::Compute {
                task_definition, ..
            } => task_definition.clone(),
            Self::StaticSite { deployment_id, .. } => deployment_id.clone(),
            Self::Database { migration_id, .. } => migration_id.clone(),
        }
    }
}

/// Health flags recorded at capture time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHealth {
    pub backend: bool,
    pub frontend: bool,
    pub database: bool,
}

impl SnapshotHealth {
    pub fn all_healthy(&self) -> bool {
        self.backend && self.frontend && self.database
    }

    pub fn set(&mut self, target: DeployTarget, healthy: bool) {
        match target {
            DeployTarget::Backend => self.backend = healthy,
            DeployTarget::Frontend => self.frontend = healthy,
            DeployTarget::Database => self.database = healthy,
        }
    }
}

/// A recorded deployment state that rollback can return to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSnapshot {
    pub id: String,
    pub timestamp: u64,
    pub services: BTreeMap<DeployTarget, VersionDescriptor>,
    pub health_checks: SnapshotHealth,
}

impl DeploymentSnapshot {
    /// Only snapshots captured while everything was healthy may be restored.
    pub fn is_rollback_candidate(&self) -> bool {
        self.health_checks.all_healthy()
    }

    pub fn descriptor(&self, target: DeployTarget) -> Option<&VersionDescriptor> {
        self.services.get(&target)
    }
}

// ── Rollback ───────────────────────────────────────────────────────

fn default_initiator() -> String {
    "operator".to_string()
}

/// A rollback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackConfig {
    pub service: RollbackScope,
    /// Snapshot id to return to; the newest valid snapshot when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub reason: String,
    #[serde(default = "default_initiator")]
    pub initiated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<bool>,
}

impl RollbackConfig {
    pub fn new(service: RollbackScope, reason: &str) -> Self {
        Self {
            service,
            target_version: None,
            reason: reason.to_string(),
            initiated_by: default_initiator(),
            automatic: None,
        }
    }

    pub fn with_target(mut self, snapshot_id: &str) -> Self {
        self.target_version = Some(snapshot_id.to_string());
        self
    }
}

/// Outcome of rolling back one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub success: bool,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_to: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollbackResult {
    pub fn failed(service: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            service: service.to_string(),
            previous_version: None,
            rolled_back_to: None,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

// ── Notifications ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

/// A structured alert handed to the notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub title: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceName>,
    #[serde(default)]
    pub details: Details,
    pub timestamp: u64,
}

impl Alert {
    pub fn new(title: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            severity,
            service: None,
            details: Details::new(),
            timestamp: crate::epoch_millis(),
        }
    }

    pub fn for_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

// ── Audit ──────────────────────────────────────────────────────────

/// Terminal state of a rollback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollbackOutcome {
    Stabilized,
    DidNotStabilize,
    /// No snapshot could be selected; nothing was touched.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    pub id: String,
    pub result: RecoveryResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: String,
    pub snapshot_id: String,
    pub valid: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRecord {
    pub id: String,
    pub config: RollbackConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub results: Vec<RollbackResult>,
    pub outcome: RollbackOutcome,
    pub duration_ms: u64,
    pub timestamp: u64,
}

/// Write-once record appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuditRecord {
    Recovery(RecoveryRecord),
    Snapshot(SnapshotRecord),
    Rollback(RollbackRecord),
}

impl AuditRecord {
    pub fn id(&self) -> &str {
        match self {
            Self::Recovery(r) => &r.id,
            Self::Snapshot(r) => &r.id,
            Self::Rollback(r) => &r.id,
        }
    }

    /// Kind label, also used as the log file prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Recovery(_) => "recovery",
            Self::Snapshot(_) => "snapshot",
            Self::Rollback(_) => "rollback",
        }
    }
}
