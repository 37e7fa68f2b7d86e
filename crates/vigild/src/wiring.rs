//! Subsystem assembly from `VigilConfig`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use vigil_adapters::{
    CommandCompute, CommandDatabase, CommandStaticSite, FanoutNotifier, TracingNotifier,
    WebhookNotifier, run_command,
};
use vigil_core::config::{ActionConfig, ProbeConfig, ProbeKind};
use vigil_core::{
    AdapterError, AdapterResult, ComputeAdapter, DatabaseBackupAdapter, HealthStatus,
    NotificationSink, StaticSiteAdapter, VersionDescriptor, VigilConfig,
};
use vigil_health::{CommandProbe, HealthEngine, HttpProbe, Probe, ProbeRegistration, TcpProbe};
use vigil_metrics::MetricsCollector;
use vigil_recovery::{AutoRecovery, RecoveryAction, RecoveryOrchestrator, RecoveryStep};
use vigil_rollback::{ControlPlane, RollbackCoordinator, RollbackPolicy, SnapshotManager};
use vigil_state::FileStore;

/// Every long-lived subsystem, built once per process.
pub struct Vigil {
    pub config: VigilConfig,
    pub store: FileStore,
    pub health: Arc<HealthEngine>,
    pub recovery: Arc<RecoveryOrchestrator>,
    pub snapshots: Arc<SnapshotManager>,
    pub rollback: Arc<RollbackCoordinator>,
    pub notifier: Arc<dyn NotificationSink>,
    pub metrics: Arc<MetricsCollector>,
}

impl Vigil {
    /// Build all subsystems. `data_dir` overrides `server.data_dir`.
    pub fn build(config: VigilConfig, data_dir: &Path) -> anyhow::Result<Self> {
        let store = FileStore::open(data_dir)
            .with_context(|| format!("failed to open state in {}", data_dir.display()))?;
        info!(path = ?data_dir, "state store opened");

        let health = Arc::new(build_health(&config)?);
        info!(probes = ?health.service_names(), "health engine initialized");

        let notifier = build_notifier(&config)?;
        let metrics = Arc::new(MetricsCollector::new());

        let mut recovery = RecoveryOrchestrator::new(
            health.clone(),
            notifier.clone(),
            Arc::new(store.clone()),
            config.recovery.cooldown(),
        )
        .with_metrics(metrics.clone());
        for action in &config.recovery.actions {
            recovery.register_action(&action.service, build_action(action, health.clone()));
        }
        info!(actions = ?recovery.registered_services(), "recovery orchestrator initialized");

        let control = build_control_plane(&config);
        let snapshots = SnapshotManager::new(
            health.clone(),
            control.clone(),
            store.clone(),
            config.rollback.targets.clone(),
        );
        let rollback = RollbackCoordinator::new(
            health.clone(),
            control,
            store.clone(),
            notifier.clone(),
            RollbackPolicy {
                max_retries: config.rollback.max_retries,
                retry_delay: config.rollback.retry_delay(),
                targets: config.rollback.targets.clone(),
            },
        )
        .with_metrics(metrics.clone());

        Ok(Self {
            config,
            store,
            health,
            recovery: Arc::new(recovery),
            snapshots: Arc::new(snapshots),
            rollback: Arc::new(rollback),
            notifier,
            metrics,
        })
    }

    pub fn api_state(&self) -> vigil_api::ApiState {
        vigil_api::ApiState {
            health: self.health.clone(),
            recovery: self.recovery.clone(),
            snapshots: self.snapshots.clone(),
            rollback: self.rollback.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn router(&self) -> axum::Router {
        vigil_api::build_router(self.api_state())
    }

    /// Start the periodic sweep if `recovery.auto_sweep` is set.
    pub fn start_auto_recovery(&self) -> Option<AutoRecovery> {
        self.config.recovery.auto_sweep.then(|| {
            AutoRecovery::start(self.recovery.clone(), self.config.recovery.sweep_interval())
        })
    }
}

fn build_health(config: &VigilConfig) -> anyhow::Result<HealthEngine> {
    let settings = &config.health;
    let mut engine = HealthEngine::new(
        &settings.version,
        &settings.environment,
        settings.cache_ttl(),
    );
    for probe in &settings.probes {
        let registration = ProbeRegistration::new(&probe.name, build_probe(probe)?)
            .timeout(probe.timeout(settings))
            .degraded_after(probe.degraded_after(settings))
            .critical(probe.critical);
        engine.register(registration)?;
        debug!(name = %probe.name, kind = ?probe.kind, "probe registered");
    }
    Ok(engine)
}

fn build_probe(probe: &ProbeConfig) -> anyhow::Result<Arc<dyn Probe>> {
    let missing = |field: &str| anyhow::anyhow!("probe '{}' is missing `{field}`", probe.name);
    Ok(match probe.kind {
        ProbeKind::Http => {
            let address = probe.address.as_deref().ok_or_else(|| missing("address"))?;
            Arc::new(HttpProbe::new(address, probe.path.as_deref().unwrap_or("/")))
        }
        ProbeKind::Tcp => {
            let address = probe.address.as_deref().ok_or_else(|| missing("address"))?;
            Arc::new(TcpProbe::new(address))
        }
        ProbeKind::Command => {
            let command = probe.command.as_deref().ok_or_else(|| missing("command"))?;
            Arc::new(CommandProbe::new(command))
        }
    })
}

fn build_notifier(config: &VigilConfig) -> anyhow::Result<Arc<dyn NotificationSink>> {
    let mut fanout = FanoutNotifier::new(vec![Arc::new(TracingNotifier)]);
    if let Some(url) = &config.notify.webhook_url {
        fanout.push(Arc::new(WebhookNotifier::new(
            url,
            config.notify.webhook_timeout(),
        )?));
        info!(%url, "webhook notifications enabled");
    }
    Ok(Arc::new(fanout))
}

/// Runs the configured shell command; optionally confirms with a fresh probe.
struct CommandStep {
    service: String,
    command: String,
    verify: bool,
    health: Arc<HealthEngine>,
}

#[async_trait]
impl RecoveryStep for CommandStep {
    async fn attempt(&self) -> anyhow::Result<bool> {
        run_command(&self.command).await?;
        if !self.verify {
            return Ok(true);
        }
        let result = self.health.check_service_fresh(&self.service).await?;
        Ok(result.status == HealthStatus::Healthy)
    }
}

fn build_action(action: &ActionConfig, health: Arc<HealthEngine>) -> RecoveryAction {
    RecoveryAction::new(
        action.retry_count,
        action.retry_delay(),
        Arc::new(CommandStep {
            service: action.service.clone(),
            command: action.command.clone(),
            verify: action.verify,
            health,
        }),
    )
}

/// Stands in for an adapter section missing from `vigil.toml`.
struct Unconfigured(&'static str);

impl Unconfigured {
    fn error(&self) -> AdapterError {
        AdapterError::Unsupported(format!("[adapters.{}] is not configured", self.0))
    }
}

#[async_trait]
impl ComputeAdapter for Unconfigured {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        Err(self.error())
    }

    async fn deploy(&self, _version: &VersionDescriptor) -> AdapterResult<()> {
        Err(self.error())
    }

    async fn wait_stable(&self) -> AdapterResult<()> {
        Err(self.error())
    }
}

#[async_trait]
impl StaticSiteAdapter for Unconfigured {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        Err(self.error())
    }

    async fn rollback_to(&self, _version: &VersionDescriptor) -> AdapterResult<()> {
        Err(self.error())
    }

    async fn promote(&self, _version: &VersionDescriptor) -> AdapterResult<()> {
        Err(self.error())
    }
}

#[async_trait]
impl DatabaseBackupAdapter for Unconfigured {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        Err(self.error())
    }

    async fn backup(&self, _id: &str) -> AdapterResult<String> {
        Err(self.error())
    }

    async fn restore(&self, _backup_ref: &str) -> AdapterResult<()> {
        Err(self.error())
    }

    async fn reconcile_schema(&self) -> AdapterResult<()> {
        Err(self.error())
    }
}

fn build_control_plane(config: &VigilConfig) -> ControlPlane {
    let adapters = &config.adapters;
    let compute: Arc<dyn ComputeAdapter> = match &adapters.compute {
        Some(commands) => Arc::new(CommandCompute::new(commands.clone())),
        None => Arc::new(Unconfigured("compute")),
    };
    let static_site: Arc<dyn StaticSiteAdapter> = match &adapters.static_site {
        Some(commands) => Arc::new(CommandStaticSite::new(commands.clone())),
        None => Arc::new(Unconfigured("static_site")),
    };
    let database: Arc<dyn DatabaseBackupAdapter> = match &adapters.database {
        Some(commands) => Arc::new(CommandDatabase::new(commands.clone())),
        None => Arc::new(Unconfigured("database")),
    };
    ControlPlane::new(compute, static_site, database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_from_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = VigilConfig::from_toml_str(
            r#"
[[health.probes]]
name = "database"
kind = "command"
command = "true"
critical = true

[[recovery.actions]]
service = "database"
command = "true"
"#,
        )
        .unwrap();

        let vigil = Vigil::build(config, dir.path()).unwrap();
        assert_eq!(vigil.health.service_names(), vec!["database".to_string()]);
        assert_eq!(
            vigil.recovery.registered_services(),
            vec!["database".to_string()]
        );
        assert!(vigil.start_auto_recovery().is_none());
    }

    #[tokio::test]
    async fn builds_from_sample_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/vigil.toml");
        let config = VigilConfig::from_file(&path).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let vigil = Vigil::build(config, dir.path()).unwrap();
        assert_eq!(vigil.health.service_names().len(), 4);
        assert_eq!(
            vigil.recovery.registered_services(),
            vec!["cache".to_string(), "database".to_string()]
        );
        let sweep = vigil.start_auto_recovery().unwrap();
        assert!(sweep.is_running());
        sweep.stop().await;
    }

    #[tokio::test]
    async fn command_step_verifies_with_fresh_probe() {
        let mut engine = HealthEngine::new("1.0.0", "test", std::time::Duration::from_secs(30));
        engine
            .register(ProbeRegistration::new(
                "cache",
                Arc::new(CommandProbe::new("exit 1")),
            ))
            .unwrap();
        let health = Arc::new(engine);

        let verified = CommandStep {
            service: "cache".to_string(),
            command: "true".to_string(),
            verify: true,
            health: health.clone(),
        };
        assert!(!verified.attempt().await.unwrap());

        let trusting = CommandStep {
            service: "cache".to_string(),
            command: "true".to_string(),
            verify: false,
            health,
        };
        assert!(trusting.attempt().await.unwrap());
    }

    #[tokio::test]
    async fn missing_adapter_section_is_unsupported() {
        let control = build_control_plane(&VigilConfig::default());
        let err = control.compute.current_version().await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(ref m) if m.contains("compute")));
    }
}
