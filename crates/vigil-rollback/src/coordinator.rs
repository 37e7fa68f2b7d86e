//! RollbackCoordinator: returns services to a known-good snapshot.
//!
//! A rollback moves through these phases:
//!
//! ```text
//! Idle → SnapshotSelection → ServiceRollback{target}... → VerificationPolling{attempt, max}
//!                                                            → Stabilized | TimedOut
//! ```
//!
//! Targets are always processed backend, frontend, database so the data
//! layer is restored last. One rollback runs at a time; later calls wait.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use vigil_core::{
    AdapterError, Alert, AuditRecord, DeployTarget, DeploymentSnapshot, HealthStatus,
    NotificationSink, RollbackConfig, RollbackOutcome, RollbackRecord, RollbackResult, Severity,
    SystemHealth, VersionDescriptor, config::TargetProbes, epoch_millis, next_id,
};
use vigil_health::HealthEngine;
use vigil_metrics::MetricsCollector;
use vigil_state::{FileStore, StateError};

use crate::control::ControlPlane;
use crate::error::RollbackError;

pub const NO_VALID_SNAPSHOT: &str = "No valid snapshot found for rollback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RollbackPhase {
    Idle,
    SnapshotSelection,
    ServiceRollback { target: DeployTarget },
    VerificationPolling { attempt: u32, max: u32 },
    Stabilized,
    TimedOut,
}

/// Verification budget and the probes that define "stable".
#[derive(Debug, Clone)]
pub struct RollbackPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub targets: TargetProbes,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay: Duration::from_secs(10),
            targets: TargetProbes::default(),
        }
    }
}

pub struct RollbackCoordinator {
    health: Arc<HealthEngine>,
    control: ControlPlane,
    store: FileStore,
    notifier: Arc<dyn NotificationSink>,
    policy: RollbackPolicy,
    phase: Mutex<RollbackPhase>,
    running: tokio::sync::Mutex<()>,
    metrics: Arc<MetricsCollector>,
}

impl RollbackCoordinator {
    pub fn new(
        health: Arc<HealthEngine>,
        control: ControlPlane,
        store: FileStore,
        notifier: Arc<dyn NotificationSink>,
        policy: RollbackPolicy,
    ) -> Self {
        Self {
            health,
            control,
            store,
            notifier,
            policy,
            phase: Mutex::new(RollbackPhase::Idle),
            running: tokio::sync::Mutex::new(()),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Share a collector with the rest of the process.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase(&self) -> RollbackPhase {
        self.phase.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_phase(&self, phase: RollbackPhase) {
        debug!(?phase, "rollback phase");
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Past rollbacks, newest first.
    pub fn history(&self) -> Result<Vec<RollbackRecord>, StateError> {
        self.store.rollback_history()
    }

    /// Roll back the services named by `config.service`.
    ///
    /// Returns one result per service. When no valid snapshot exists the
    /// single result carries [`NO_VALID_SNAPSHOT`] and nothing is touched.
    pub async fn rollback(
        &self,
        config: RollbackConfig,
    ) -> Result<Vec<RollbackResult>, RollbackError> {
        let _running = self.running.lock().await;
        let started = Instant::now();

        info!(
            scope = %config.service,
            reason = %config.reason,
            initiated_by = %config.initiated_by,
            target = ?config.target_version,
            "rollback initiated"
        );
        self.notify(
            Alert::new(format!("Rollback initiated: {}", config.service), Severity::High)
                .detail("reason", config.reason.as_str())
                .detail("initiatedBy", config.initiated_by.as_str())
                .detail("automatic", config.automatic.unwrap_or(false)),
        )
        .await;

        self.set_phase(RollbackPhase::SnapshotSelection);
        let snapshot = match self.select_snapshot(&config) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                warn!(scope = %config.service, "no valid snapshot to roll back to");
                let elapsed = elapsed_ms(started);
                let results = vec![RollbackResult::failed(
                    config.service.as_str(),
                    NO_VALID_SNAPSHOT,
                    elapsed,
                )];
                self.set_phase(RollbackPhase::Idle);
                self.record(&config, None, &results, RollbackOutcome::Aborted, elapsed);
                return Ok(results);
            }
            Err(e) => {
                self.set_phase(RollbackPhase::Idle);
                return Err(e.into());
            }
        };
        info!(snapshot = %snapshot.id, "rolling back to snapshot");

        let mut results = Vec::new();
        for target in config.service.targets() {
            self.set_phase(RollbackPhase::ServiceRollback { target });
            results.push(self.rollback_target(target, &snapshot).await);
        }

        let stabilized = self.verify().await;
        let elapsed = elapsed_ms(started);

        if let Some(attempts) = stabilized {
            self.set_phase(RollbackPhase::Stabilized);
            info!(snapshot = %snapshot.id, attempts, duration_ms = elapsed, "rollback stabilized");
            self.record(
                &config,
                Some(&snapshot.id),
                &results,
                RollbackOutcome::Stabilized,
                elapsed,
            );
            self.notify(
                Alert::new(
                    format!("Rollback completed: {}", config.service),
                    Severity::Info,
                )
                .detail("snapshotId", snapshot.id.as_str())
                .detail("durationMs", elapsed),
            )
            .await;
            return Ok(results);
        }

        let attempts = self.policy.max_retries.max(1);
        self.set_phase(RollbackPhase::TimedOut);
        error!(snapshot = %snapshot.id, attempts, "rollback did not stabilize; manual intervention required");
        self.record(
            &config,
            Some(&snapshot.id),
            &results,
            RollbackOutcome::DidNotStabilize,
            elapsed,
        );
        self.notify(
            Alert::new(
                format!("Rollback did not stabilize: {}", config.service),
                Severity::Critical,
            )
            .detail("snapshotId", snapshot.id.as_str())
            .detail("attempts", attempts),
        )
        .await;
        Err(RollbackError::DidNotStabilize { attempts, results })
    }

    fn select_snapshot(
        &self,
        config: &RollbackConfig,
    ) -> Result<Option<DeploymentSnapshot>, StateError> {
        let Some(id) = &config.target_version else {
            return self.store.latest_valid_snapshot();
        };
        let snapshot = match self.store.get_snapshot(id) {
            Ok(snapshot) => snapshot,
            Err(StateError::InvalidId(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(snapshot.filter(|s| {
            let valid = s.is_rollback_candidate();
            if !valid {
                warn!(snapshot = %s.id, "requested snapshot was captured while unhealthy");
            }
            valid
        }))
    }

    async fn rollback_target(
        &self,
        target: DeployTarget,
        snapshot: &DeploymentSnapshot,
    ) -> RollbackResult {
        let started = Instant::now();
        let Some(descriptor) = snapshot.descriptor(target) else {
            return RollbackResult::failed(
                target.as_str(),
                format!("snapshot {} has no {target} version", snapshot.id),
                elapsed_ms(started),
            );
        };

        let outcome = match target {
            DeployTarget::Backend => self.rollback_backend(descriptor).await,
            DeployTarget::Frontend => self.rollback_frontend(descriptor).await,
            DeployTarget::Database => self.rollback_database(descriptor, &snapshot.id).await,
        };
        let duration_ms = elapsed_ms(started);

        match outcome {
            Ok(previous_version) => {
                info!(%target, to = %descriptor.label(), duration_ms, "service rolled back");
                RollbackResult {
                    success: true,
                    service: target.as_str().to_string(),
                    previous_version,
                    rolled_back_to: Some(descriptor.label()),
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(%target, error = %e, "service rollback failed");
                RollbackResult::failed(target.as_str(), e.to_string(), duration_ms)
            }
        }
    }

    async fn rollback_backend(
        &self,
        descriptor: &VersionDescriptor,
    ) -> Result<Option<String>, AdapterError> {
        let compute = &self.control.compute;
        let previous = current_label(compute.current_version().await, DeployTarget::Backend);
        compute.deploy(descriptor).await?;
        compute.wait_stable().await?;
        Ok(previous)
    }

    async fn rollback_frontend(
        &self,
        descriptor: &VersionDescriptor,
    ) -> Result<Option<String>, AdapterError> {
        let site = &self.control.static_site;
        let previous = current_label(site.current_version().await, DeployTarget::Frontend);
        match site.rollback_to(descriptor).await {
            Err(AdapterError::Unsupported(_)) => {
                debug!("native rollback unsupported; promoting earlier deployment");
                site.promote(descriptor).await?;
            }
            other => other?,
        }
        Ok(previous)
    }

    /// Safety backup first; the restore never runs without one.
    async fn rollback_database(
        &self,
        descriptor: &VersionDescriptor,
        snapshot_id: &str,
    ) -> Result<Option<String>, AdapterError> {
        let VersionDescriptor::Database {
            backup_ref: Some(backup_ref),
            ..
        } = descriptor
        else {
            return Err(AdapterError::InvalidOutput(format!(
                "snapshot {snapshot_id} has no database backup"
            )));
        };

        let database = &self.control.database;
        let safety_id = format!("safety-{snapshot_id}-{}", epoch_millis());
        let safety_ref = database
            .backup(&safety_id)
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("safety backup failed: {e}")))?;
        info!(%safety_ref, "safety backup taken");

        database.restore(backup_ref).await?;
        database.reconcile_schema().await?;
        Ok(Some(safety_ref))
    }

    /// Poll health until every target probe is healthy. Returns the number
    /// of polls it took, or `None` when the budget ran out.
    async fn verify(&self) -> Option<u32> {
        let max = self.policy.max_retries.max(1);
        for attempt in 1..=max {
            self.set_phase(RollbackPhase::VerificationPolling { attempt, max });
            let health = self.health.check_health_fresh().await;
            if self.is_stable(&health) {
                return Some(attempt);
            }
            debug!(attempt, max, status = %health.status, "services not yet stable");
            if attempt < max {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
        None
    }

    fn is_stable(&self, health: &SystemHealth) -> bool {
        DeployTarget::ORDERED.iter().all(|target| {
            health
                .service(self.policy.targets.probe_for(*target))
                .is_some_and(|r| r.status == HealthStatus::Healthy)
        })
    }

    async fn notify(&self, alert: Alert) {
        if let Err(e) = self.notifier.notify(&alert).await {
            warn!(title = %alert.title, error = %e, "failed to send rollback notification");
        }
    }

    fn record(
        &self,
        config: &RollbackConfig,
        snapshot_id: Option<&str>,
        results: &[RollbackResult],
        outcome: RollbackOutcome,
        duration_ms: u64,
    ) {
        self.metrics.record_rollback(outcome, results);
        let record = AuditRecord::Rollback(RollbackRecord {
            id: next_id("rollback"),
            config: config.clone(),
            snapshot_id: snapshot_id.map(str::to_string),
            results: results.to_vec(),
            outcome,
            duration_ms,
            timestamp: epoch_millis(),
        });
        if let Err(e) = self.store.append_record(&record) {
            warn!(error = %e, "failed to append rollback audit record");
        }
    }
}

fn current_label(
    current: Result<VersionDescriptor, AdapterError>,
    target: DeployTarget,
) -> Option<String> {
    match current {
        Ok(version) => Some(version.label()),
        Err(e) => {
            warn!(%target, error = %e, "could not read current version");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
