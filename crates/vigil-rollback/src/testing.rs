//! Recording fakes for the control-plane adapters.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vigil_core::*;
use vigil_health::{HealthEngine, ProbeError, ProbeRegistration, probe_fn};

use crate::control::ControlPlane;

/// Ordered log of adapter calls across all fakes.
#[derive(Default)]
pub struct Calls(Mutex<Vec<String>>);

impl Calls {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct FakeCompute {
    calls: Arc<Calls>,
    current: Mutex<VersionDescriptor>,
    pub fail_deploy: AtomicBool,
}

#[async_trait]
impl ComputeAdapter for FakeCompute {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        self.calls.push("compute.current");
        Ok(self.current.lock().unwrap().clone())
    }

    async fn deploy(&self, version: &VersionDescriptor) -> AdapterResult<()> {
        self.calls.push(format!("compute.deploy:{}", version.label()));
        if self.fail_deploy.load(Ordering::SeqCst) {
            return Err(AdapterError::Command {
                command: "deploy".to_string(),
                status: 1,
                stderr: "service not found".to_string(),
            });
        }
        *self.current.lock().unwrap() = version.clone();
        Ok(())
    }

    async fn wait_stable(&self) -> AdapterResult<()> {
        self.calls.push("compute.wait_stable");
        Ok(())
    }
}

pub struct FakeStaticSite {
    calls: Arc<Calls>,
    pub native_rollback: AtomicBool,
}

#[async_trait]
impl StaticSiteAdapter for FakeStaticSite {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        self.calls.push("site.current");
        Ok(VersionDescriptor::StaticSite {
            deployment_id: "dpl_current".to_string(),
            url: None,
        })
    }

    async fn rollback_to(&self, version: &VersionDescriptor) -> AdapterResult<()> {
        self.calls.push(format!("site.rollback:{}", version.label()));
        if self.native_rollback.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AdapterError::Unsupported("rollback".to_string()))
        }
    }

    async fn promote(&self, version: &VersionDescriptor) -> AdapterResult<()> {
        self.calls.push(format!("site.promote:{}", version.label()));
        Ok(())
    }
}

pub struct FakeDatabase {
    calls: Arc<Calls>,
    pub fail_backup: AtomicBool,
}

#[async_trait]
impl DatabaseBackupAdapter for FakeDatabase {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        self.calls.push("db.current");
        Ok(VersionDescriptor::Database {
            migration_id: "20260101_init".to_string(),
            backup_ref: None,
        })
    }

    async fn backup(&self, id: &str) -> AdapterResult<String> {
        self.calls.push(format!("db.backup:{id}"));
        if self.fail_backup.load(Ordering::SeqCst) {
            return Err(AdapterError::Other(anyhow::anyhow!("disk full")));
        }
        Ok(format!("/backups/{id}.sql"))
    }

    async fn restore(&self, backup_ref: &str) -> AdapterResult<()> {
        self.calls.push(format!("db.restore:{backup_ref}"));
        Ok(())
    }

    async fn reconcile_schema(&self) -> AdapterResult<()> {
        self.calls.push("db.reconcile");
        Ok(())
    }
}

pub struct Fakes {
    pub calls: Arc<Calls>,
    pub compute: Arc<FakeCompute>,
    pub static_site: Arc<FakeStaticSite>,
    pub database: Arc<FakeDatabase>,
}

impl Fakes {
    pub fn new() -> Self {
        let calls = Arc::new(Calls::default());
        Self {
            compute: Arc::new(FakeCompute {
                calls: calls.clone(),
                current: Mutex::new(VersionDescriptor::Compute {
                    task_definition: "api:42".to_string(),
                    image: None,
                }),
                fail_deploy: AtomicBool::new(false),
            }),
            static_site: Arc::new(FakeStaticSite {
                calls: calls.clone(),
                native_rollback: AtomicBool::new(true),
            }),
            database: Arc::new(FakeDatabase {
                calls: calls.clone(),
                fail_backup: AtomicBool::new(false),
            }),
            calls,
        }
    }

    pub fn control_plane(&self) -> ControlPlane {
        ControlPlane::new(
            self.compute.clone(),
            self.static_site.clone(),
            self.database.clone(),
        )
    }
}

/// A probe that fails its first `failures` calls, then succeeds.
pub fn healthy_after(name: &str, failures: u32) -> ProbeRegistration {
    let calls = Arc::new(AtomicU32::new(0));
    ProbeRegistration::new(
        name,
        probe_fn(move || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    Err(ProbeError::Unreachable("connection refused".to_string()))
                } else {
                    Ok(Details::new())
                }
            }
        }),
    )
}

/// Engine with backend/frontend/database probes failing the given number
/// of times before turning healthy.
pub fn engine(backend: u32, frontend: u32, database: u32) -> Arc<HealthEngine> {
    let mut engine = HealthEngine::new("1.0.0", "test", Duration::from_secs(30));
    engine.register(healthy_after("backend", backend)).unwrap();
    engine.register(healthy_after("frontend", frontend)).unwrap();
    engine.register(healthy_after("database", database)).unwrap();
    Arc::new(engine)
}

#[derive(Default)]
pub struct RecordingNotifier(Mutex<Vec<Alert>>);

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
