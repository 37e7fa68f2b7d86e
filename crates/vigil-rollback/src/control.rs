//! The control-plane adapters rollback and snapshots drive.

use std::sync::Arc;

use vigil_core::{ComputeAdapter, DatabaseBackupAdapter, StaticSiteAdapter};

/// Compute, static-site and database adapters, shared by the snapshot
/// manager and the rollback coordinator.
#[derive(Clone)]
pub struct ControlPlane {
    pub compute: Arc<dyn ComputeAdapter>,
    pub static_site: Arc<dyn StaticSiteAdapter>,
    pub database: Arc<dyn DatabaseBackupAdapter>,
}

impl ControlPlane {
    pub fn new(
        compute: Arc<dyn ComputeAdapter>,
        static_site: Arc<dyn StaticSiteAdapter>,
        database: Arc<dyn DatabaseBackupAdapter>,
    ) -> Self {
        Self {
            compute,
            static_site,
            database,
        }
    }
}
