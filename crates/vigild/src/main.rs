//! vigild: the Vigil daemon.
//!
//! Single binary that assembles all Vigil subsystems:
//! - State store (JSON files under the data directory)
//! - Health probe engine
//! - Recovery orchestrator + optional auto-recovery sweep
//! - Snapshot manager and rollback coordinator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! vigild --config /etc/vigil/vigil.toml serve --listen 0.0.0.0:8600
//! vigild --config vigil.toml check --service database
//! vigild --config vigil.toml snapshot
//! vigild --config vigil.toml rollback --service all --reason "error rate spike"
//! ```

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vigil_core::{HealthStatus, RollbackConfig, RollbackScope, VigilConfig};
use vigil_rollback::RollbackError;
use vigild::Vigil;

const DEFAULT_FILTER: &str = "info,vigild=debug,vigil=debug";

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil health, recovery and rollback daemon")]
struct Cli {
    /// Path to vigil.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for snapshots and audit logs (overrides server.data_dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server (and the auto-recovery sweep when enabled).
    Serve {
        /// Listen address (overrides server.listen).
        #[arg(long)]
        listen: Option<String>,
    },
    /// Probe dependencies once and print the result.
    Check {
        /// Only check this service.
        #[arg(long)]
        service: Option<String>,
    },
    /// Capture a deployment snapshot.
    Snapshot,
    /// Roll back to the newest valid snapshot (or `--target`).
    Rollback {
        #[arg(long, value_enum, default_value_t = Scope::All)]
        service: Scope,

        #[arg(long)]
        reason: String,

        /// Snapshot id to return to.
        #[arg(long)]
        target: Option<String>,

        #[arg(long, default_value = "operator")]
        initiated_by: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scope {
    Backend,
    Frontend,
    Database,
    All,
}

impl From<Scope> for RollbackScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Backend => RollbackScope::Backend,
            Scope::Frontend => RollbackScope::Frontend,
            Scope::Database => RollbackScope::Database,
            Scope::All => RollbackScope::All,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = match &cli.config {
        Some(path) => VigilConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => VigilConfig::default(),
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.server.data_dir.clone());
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let vigil = Vigil::build(config, &data_dir)?;

    match cli.command {
        Command::Serve { listen } => run_serve(vigil, listen).await,
        Command::Check { service } => run_check(&vigil, service).await,
        Command::Snapshot => {
            let snapshot = vigil.snapshots.create_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Command::Rollback {
            service,
            reason,
            target,
            initiated_by,
        } => {
            let mut config = RollbackConfig::new(service.into(), &reason);
            config.target_version = target;
            config.initiated_by = initiated_by;
            run_rollback(&vigil, config).await
        }
    }
}

async fn run_serve(vigil: Vigil, listen: Option<String>) -> anyhow::Result<()> {
    info!("Vigil daemon starting");

    let addr = listen.unwrap_or_else(|| vigil.config.server.listen.clone());
    let sweep = vigil.start_auto_recovery();
    let router = vigil.router();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    if let Some(sweep) = sweep {
        sweep.stop().await;
    }
    info!("Vigil daemon stopped");
    Ok(())
}

async fn run_check(vigil: &Vigil, service: Option<String>) -> anyhow::Result<()> {
    let status = match service {
        Some(name) => {
            let result = vigil.health.check_service_fresh(&name).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.status
        }
        None => {
            let health = vigil.health.check_health_fresh().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            health.status
        }
    };
    if status == HealthStatus::Unhealthy {
        bail!("unhealthy");
    }
    Ok(())
}

async fn run_rollback(vigil: &Vigil, config: RollbackConfig) -> anyhow::Result<()> {
    match vigil.rollback.rollback(config).await {
        Ok(results) => {
            println!("{}", serde_json::to_string_pretty(&results)?);
            if results.iter().any(|r| !r.success) {
                bail!("rollback completed with failures");
            }
            Ok(())
        }
        Err(RollbackError::DidNotStabilize { attempts, results }) => {
            println!("{}", serde_json::to_string_pretty(&results)?);
            bail!("services did not stabilize after {attempts} health checks; manual intervention required")
        }
        Err(e) => Err(e.into()),
    }
}
