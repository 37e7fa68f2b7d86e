//! SnapshotManager: records what is deployed and whether it was healthy.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use vigil_core::{
    AuditRecord, DeployTarget, DeploymentSnapshot, HealthStatus, SnapshotHealth, SnapshotRecord,
    VersionDescriptor, config::TargetProbes, epoch_millis, next_id,
};
use vigil_health::HealthEngine;
use vigil_state::FileStore;

use crate::control::ControlPlane;
use crate::error::{SnapshotError, SnapshotResult};

pub struct SnapshotManager {
    health: Arc<HealthEngine>,
    control: ControlPlane,
    store: FileStore,
    targets: TargetProbes,
}

impl SnapshotManager {
    pub fn new(
        health: Arc<HealthEngine>,
        control: ControlPlane,
        store: FileStore,
        targets: TargetProbes,
    ) -> Self {
        Self {
            health,
            control,
            store,
            targets,
        }
    }

    /// Capture the current deployment and persist it.
    ///
    /// The snapshot is a rollback candidate only if every target's probe
    /// reported `Healthy` at capture time.
    pub async fn create_snapshot(&self) -> SnapshotResult<DeploymentSnapshot> {
        let id = next_id("snap");

        let (backend, frontend, database, health) = tokio::join!(
            self.control.compute.current_version(),
            self.control.static_site.current_version(),
            self.control.database.current_version(),
            self.health.check_health_fresh(),
        );
        let backend = backend.map_err(|source| SnapshotError::Version {
            target: DeployTarget::Backend,
            source,
        })?;
        let frontend = frontend.map_err(|source| SnapshotError::Version {
            target: DeployTarget::Frontend,
            source,
        })?;
        let database = database.map_err(|source| SnapshotError::Version {
            target: DeployTarget::Database,
            source,
        })?;

        let mut health_checks = SnapshotHealth::default();
        for target in DeployTarget::ORDERED {
            let probe = self.targets.probe_for(target);
            let healthy = health
                .service(probe)
                .is_some_and(|r| r.status == HealthStatus::Healthy);
            health_checks.set(target, healthy);
        }

        let backup_ref = self
            .control
            .database
            .backup(&id)
            .await
            .map_err(SnapshotError::Backup)?;
        let database = match database {
            VersionDescriptor::Database { migration_id, .. } => VersionDescriptor::Database {
                migration_id,
                backup_ref: Some(backup_ref),
            },
            other => other,
        };

        let mut services = BTreeMap::new();
        services.insert(DeployTarget::Backend, backend);
        services.insert(DeployTarget::Frontend, frontend);
        services.insert(DeployTarget::Database, database);

        let snapshot = DeploymentSnapshot {
            id,
            timestamp: epoch_millis(),
            services,
            health_checks,
        };
        self.store.put_snapshot(&snapshot)?;

        let valid = snapshot.is_rollback_candidate();
        info!(id = %snapshot.id, valid, "deployment snapshot created");
        if !valid {
            warn!(id = %snapshot.id, health = ?snapshot.health_checks, "snapshot captured while unhealthy; not a rollback candidate");
        }

        let record = AuditRecord::Snapshot(SnapshotRecord {
            id: next_id("snapshot"),
            snapshot_id: snapshot.id.clone(),
            valid,
            timestamp: snapshot.timestamp,
        });
        if let Err(e) = self.store.append_record(&record) {
            warn!(id = %snapshot.id, error = %e, "failed to append snapshot audit record");
        }

        Ok(snapshot)
    }

    /// All snapshots, oldest first.
    pub fn list(&self) -> SnapshotResult<Vec<DeploymentSnapshot>> {
        Ok(self.store.list_snapshots()?)
    }

    pub fn get(&self, id: &str) -> SnapshotResult<Option<DeploymentSnapshot>> {
        Ok(self.store.get_snapshot(id)?)
    }

    pub fn latest_valid(&self) -> SnapshotResult<Option<DeploymentSnapshot>> {
        Ok(self.store.latest_valid_snapshot()?)
    }
}
