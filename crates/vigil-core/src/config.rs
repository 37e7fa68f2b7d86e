//! vigil.toml configuration parser.
//!
//! Every section is optional. Durations are kept as strings ("30s", "5m")
//! and parsed on access; `validate` rejects unparseable values at load time
//! so the accessors can fall back to defaults without hiding typos.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;
use crate::types::DeployTarget;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub server: ServerConfig,
    pub health: HealthSettings,
    pub recovery: RecoverySettings,
    pub rollback: RollbackSettings,
    pub adapters: AdaptersConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8600".to_string(),
            data_dir: PathBuf::from("/var/lib/vigil"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub cache_ttl: String,
    pub default_timeout: String,
    pub degraded_after: String,
    pub version: String,
    pub environment: String,
    pub probes: Vec<ProbeConfig>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            cache_ttl: "30s".to_string(),
            default_timeout: "5s".to_string(),
            degraded_after: "2s".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "production".to_string(),
            probes: Vec::new(),
        }
    }
}

impl HealthSettings {
    pub fn cache_ttl(&self) -> Duration {
        parse_duration(&self.cache_ttl).unwrap_or(Duration::from_secs(30))
    }

    pub fn default_timeout(&self) -> Duration {
        parse_duration(&self.default_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn degraded_after(&self) -> Duration {
        parse_duration(&self.degraded_after).unwrap_or(Duration::from_secs(2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Tcp,
    Command,
}

/// One `[[health.probes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    pub kind: ProbeKind,
    /// `host:port` for http and tcp probes.
    pub address: Option<String>,
    /// Request path for http probes.
    pub path: Option<String>,
    /// Shell command for command probes.
    pub command: Option<String>,
    pub timeout: Option<String>,
    pub degraded_after: Option<String>,
    /// Critical probes gate readiness.
    #[serde(default)]
    pub critical: bool,
}

impl ProbeConfig {
    pub fn timeout(&self, settings: &HealthSettings) -> Duration {
        self.timeout
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or_else(|| settings.default_timeout())
    }

    pub fn degraded_after(&self, settings: &HealthSettings) -> Duration {
        self.degraded_after
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or_else(|| settings.degraded_after())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub cooldown: String,
    pub sweep_interval: String,
    /// Start the periodic sweep with the daemon.
    pub auto_sweep: bool,
    pub actions: Vec<ActionConfig>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            cooldown: "1h".to_string(),
            sweep_interval: "5m".to_string(),
            auto_sweep: false,
            actions: Vec::new(),
        }
    }
}

impl RecoverySettings {
    pub fn cooldown(&self) -> Duration {
        parse_duration(&self.cooldown).unwrap_or(Duration::from_secs(3600))
    }

    pub fn sweep_interval(&self) -> Duration {
        parse_duration(&self.sweep_interval).unwrap_or(Duration::from_secs(300))
    }
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5s".to_string()
}

fn default_true() -> bool {
    true
}

/// One `[[recovery.actions]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub service: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
    pub command: String,
    /// Re-probe the service after the command exits zero.
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl ActionConfig {
    pub fn retry_delay(&self) -> Duration {
        parse_duration(&self.retry_delay).unwrap_or(Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackSettings {
    pub max_retries: u32,
    pub retry_delay: String,
    pub targets: TargetProbes,
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay: "10s".to_string(),
            targets: TargetProbes::default(),
        }
    }
}

impl RollbackSettings {
    pub fn retry_delay(&self) -> Duration {
        parse_duration(&self.retry_delay).unwrap_or(Duration::from_secs(10))
    }
}

/// Probe names that report the health of each deploy target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetProbes {
    pub backend: String,
    pub frontend: String,
    pub database: String,
}

impl Default for TargetProbes {
    fn default() -> Self {
        Self {
            backend: "backend".to_string(),
            frontend: "frontend".to_string(),
            database: "database".to_string(),
        }
    }
}

impl TargetProbes {
    pub fn probe_for(&self, target: DeployTarget) -> &str {
        match target {
            DeployTarget::Backend => &self.backend,
            DeployTarget::Frontend => &self.frontend,
            DeployTarget::Database => &self.database,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptersConfig {
    pub compute: Option<ComputeCommands>,
    pub static_site: Option<StaticSiteCommands>,
    pub database: Option<DatabaseCommands>,
}

/// Command templates for the compute adapter. `{version}` and `{image}`
/// expand to the target descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeCommands {
    pub current: String,
    pub deploy: String,
    pub wait_stable: String,
}

/// Command templates for the static-site adapter. `{version}` expands to
/// the deployment id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSiteCommands {
    pub current: String,
    /// Absent when the provider has no native rollback.
    pub rollback: Option<String>,
    pub promote: String,
}

/// Command templates for the database adapter. `{id}` expands to the backup
/// key and `{file}` to the backup file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCommands {
    pub current: String,
    pub backup: String,
    pub restore: String,
    pub reconcile: String,
    pub backup_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub webhook_timeout: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout: "10s".to_string(),
        }
    }
}

impl NotifyConfig {
    pub fn webhook_timeout(&self) -> Duration {
        parse_duration(&self.webhook_timeout).unwrap_or(Duration::from_secs(10))
    }
}

impl VigilConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: VigilConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        check_duration("health.cache_ttl", &self.health.cache_ttl)?;
        check_duration("health.default_timeout", &self.health.default_timeout)?;
        check_duration("health.degraded_after", &self.health.degraded_after)?;
        check_duration("recovery.cooldown", &self.recovery.cooldown)?;
        check_duration("recovery.sweep_interval", &self.recovery.sweep_interval)?;
        check_duration("rollback.retry_delay", &self.rollback.retry_delay)?;
        check_duration("notify.webhook_timeout", &self.notify.webhook_timeout)?;

        if parse_duration(&self.recovery.sweep_interval) == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "recovery.sweep_interval must be greater than zero".to_string(),
            ));
        }

        if self.rollback.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "rollback.max_retries must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for probe in &self.health.probes {
            if !names.insert(probe.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate probe name '{}'",
                    probe.name
                )));
            }
            let missing = match probe.kind {
                ProbeKind::Http | ProbeKind::Tcp => probe.address.is_none().then_some("address"),
                ProbeKind::Command => probe.command.is_none().then_some("command"),
            };
            if let Some(field) = missing {
                return Err(ConfigError::Invalid(format!(
                    "probe '{}' is missing `{field}`",
                    probe.name
                )));
            }
            if let Some(t) = &probe.timeout {
                check_duration(&format!("probe '{}' timeout", probe.name), t)?;
            }
            if let Some(t) = &probe.degraded_after {
                check_duration(&format!("probe '{}' degraded_after", probe.name), t)?;
            }
        }

        let mut services = HashSet::new();
        for action in &self.recovery.actions {
            if !services.insert(action.service.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate recovery action for '{}'",
                    action.service
                )));
            }
            if action.retry_count == 0 {
                return Err(ConfigError::Invalid(format!(
                    "recovery action '{}' needs retry_count >= 1",
                    action.service
                )));
            }
            check_duration(
                &format!("recovery action '{}' retry_delay", action.service),
                &action.retry_delay,
            )?;
        }

        Ok(())
    }
}

fn check_duration(field: &str, value: &str) -> ConfigResult<()> {
    parse_duration(value)
        .map(|_| ())
        .ok_or_else(|| ConfigError::Invalid(format!("{field}: cannot parse duration '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = VigilConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8600");
        assert_eq!(config.health.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.recovery.cooldown(), Duration::from_secs(3600));
        assert_eq!(config.recovery.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.rollback.max_retries, 10);
        assert_eq!(config.rollback.retry_delay(), Duration::from_secs(10));
        assert!(!config.recovery.auto_sweep);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:9000"
data_dir = "/tmp/vigil"

[health]
cache_ttl = "10s"
environment = "staging"

[[health.probes]]
name = "database"
kind = "tcp"
address = "127.0.0.1:5432"
timeout = "2s"
critical = true

[[health.probes]]
name = "backend"
kind = "http"
address = "127.0.0.1:8000"
path = "/health"
degraded_after = "1s"

[recovery]
cooldown = "30m"

[[recovery.actions]]
service = "database"
command = "systemctl restart postgresql"
retry_delay = "2s"

[rollback.targets]
backend = "api"

[adapters.static_site]
current = "site current"
promote = "site promote {version}"
"#;
        let config = VigilConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.health.probes.len(), 2);
        let db = &config.health.probes[0];
        assert_eq!(db.kind, ProbeKind::Tcp);
        assert!(db.critical);
        assert_eq!(db.timeout(&config.health), Duration::from_secs(2));
        assert_eq!(db.degraded_after(&config.health), Duration::from_secs(2));
        assert_eq!(
            config.health.probes[1].degraded_after(&config.health),
            Duration::from_secs(1)
        );

        let action = &config.recovery.actions[0];
        assert_eq!(action.retry_count, 3);
        assert!(action.verify);
        assert_eq!(action.retry_delay(), Duration::from_secs(2));

        assert_eq!(config.rollback.targets.probe_for(DeployTarget::Backend), "api");
        assert_eq!(
            config.rollback.targets.probe_for(DeployTarget::Database),
            "database"
        );
        let site = config.adapters.static_site.unwrap();
        assert!(site.rollback.is_none());
    }

    #[test]
    fn rejects_duplicate_probe_names() {
        let toml_str = r#"
[[health.probes]]
name = "cache"
kind = "tcp"
address = "127.0.0.1:6379"

[[health.probes]]
name = "cache"
kind = "tcp"
address = "127.0.0.1:6380"
"#;
        let err = VigilConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("duplicate probe name"));
    }

    #[test]
    fn rejects_probe_without_target() {
        let toml_str = r#"
[[health.probes]]
name = "mail"
kind = "command"
"#;
        let err = VigilConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("missing `command`"));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = VigilConfig::from_toml_str("[recovery]\ncooldown = \"forever\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_overflowing_duration() {
        let err = VigilConfig::from_toml_str("[recovery]\ncooldown = \"9999999999999999h\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("recovery.cooldown"));
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        let err =
            VigilConfig::from_toml_str("[recovery]\nsweep_interval = \"0s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("sweep_interval")));
        assert!(VigilConfig::from_toml_str("[recovery]\nsweep_interval = \"1s\"\n").is_ok());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        std::fs::write(&path, "[rollback]\nmax_retries = 3\n").unwrap();
        let config = VigilConfig::from_file(&path).unwrap();
        assert_eq!(config.rollback.max_retries, 3);
    }
}
