//! Periodic auto-recovery sweep as an explicitly stoppable task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::RecoveryOrchestrator;

/// Handle to the background sweep. Dropping it without `stop()` aborts the task.
pub struct AutoRecovery {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    interval: Duration,
}

impl AutoRecovery {
    /// Spawn the sweep. The first pass runs after one full `interval`.
    pub fn start(orchestrator: Arc<RecoveryOrchestrator>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweep_loop(orchestrator, interval, shutdown_rx));
        info!(interval_secs = interval.as_secs(), "auto-recovery sweep started");
        Self {
            handle: Some(handle),
            shutdown_tx,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop and wait for it to exit. An in-flight pass completes first.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "auto-recovery sweep ended abnormally");
            }
        }
        info!("auto-recovery sweep stopped");
    }
}

impl Drop for AutoRecovery {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_sweep_loop(
    orchestrator: Arc<RecoveryOrchestrator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let results = orchestrator.recover_failed_services().await;
                let recovered = results.iter().filter(|r| r.recovered).count();
                debug!(attempted = results.len(), recovered, "auto-recovery sweep finished");
            }
            _ = shutdown.changed() => {
                debug!("auto-recovery sweep shutting down");
                break;
            }
        }
    }
}
