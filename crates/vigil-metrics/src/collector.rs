//! Metrics collector: cumulative recovery and rollback counters.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use vigil_core::{RecoveryResult, RollbackOutcome, RollbackResult};

/// Per-service recovery totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryCounters {
    /// Individual tries of the recovery action.
    pub attempts: u64,
    pub recovered: u64,
    pub failed: u64,
}

/// Rollback invocations by terminal outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackCounters {
    pub stabilized: u64,
    pub did_not_stabilize: u64,
    pub aborted: u64,
}

/// Per-service rollback step results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceRollbackCounters {
    pub succeeded: u64,
    pub failed: u64,
}

/// Point-in-time copy of every counter, keyed by service name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub recovery: BTreeMap<String, RecoveryCounters>,
    pub rollbacks: RollbackCounters,
    pub rollback_services: BTreeMap<String, ServiceRollbackCounters>,
}

/// Counters since process start. Shared by the orchestrator, the rollback
/// coordinator and the `/metrics` handler.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsSnapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count a finished recovery sequence. Results that never ran an
    /// action (no action defined, already in progress) are ignored.
    pub fn record_recovery(&self, result: &RecoveryResult) {
        if result.attempts == 0 {
            return;
        }
        let mut inner = self.lock();
        let counters = inner.recovery.entry(result.service.clone()).or_default();
        counters.attempts += u64::from(result.attempts);
        if result.recovered {
            counters.recovered += 1;
        } else {
            counters.failed += 1;
        }
        debug!(service = %result.service, recovered = result.recovered, "recovery recorded");
    }

    /// Count a finished rollback and each per-service result it produced.
    pub fn record_rollback(&self, outcome: RollbackOutcome, results: &[RollbackResult]) {
        let mut inner = self.lock();
        match outcome {
            RollbackOutcome::Stabilized => inner.rollbacks.stabilized += 1,
            RollbackOutcome::DidNotStabilize => inner.rollbacks.did_not_stabilize += 1,
            RollbackOutcome::Aborted => {
                inner.rollbacks.aborted += 1;
                return;
            }
        }
        for result in results {
            let counters = inner
                .rollback_services
                .entry(result.service.clone())
                .or_default();
            if result.success {
                counters.succeeded += 1;
            } else {
                counters.failed += 1;
            }
        }
        debug!(?outcome, services = results.len(), "rollback recorded");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery(service: &str, recovered: bool, attempts: u32) -> RecoveryResult {
        RecoveryResult {
            service: service.to_string(),
            recovered,
            attempts,
            error: (!recovered).then(|| "connection refused".to_string()),
            timestamp: 0,
        }
    }

    fn step(service: &str, success: bool) -> RollbackResult {
        RollbackResult {
            success,
            service: service.to_string(),
            previous_version: None,
            rolled_back_to: None,
            duration_ms: 5,
            error: None,
        }
    }

    #[test]
    fn recovery_counters_accumulate_per_service() {
        let collector = MetricsCollector::new();
        collector.record_recovery(&recovery("database", true, 2));
        collector.record_recovery(&recovery("database", false, 3));
        collector.record_recovery(&recovery("cache", true, 1));

        let snapshot = collector.snapshot();
        assert_eq!(
            snapshot.recovery["database"],
            RecoveryCounters {
                attempts: 5,
                recovered: 1,
                failed: 1,
            }
        );
        assert_eq!(snapshot.recovery["cache"].recovered, 1);
    }

    #[test]
    fn skipped_recovery_is_not_counted() {
        let collector = MetricsCollector::new();
        collector.record_recovery(&RecoveryResult::skipped("search", "no recovery action defined"));
        assert!(collector.snapshot().recovery.is_empty());
    }

    #[test]
    fn rollback_outcomes_and_service_results() {
        let collector = MetricsCollector::new();
        collector.record_rollback(
            RollbackOutcome::Stabilized,
            &[step("backend", true), step("frontend", false)],
        );
        collector.record_rollback(RollbackOutcome::DidNotStabilize, &[step("backend", true)]);
        collector.record_rollback(RollbackOutcome::Aborted, &[step("all", false)]);

        let snapshot = collector.snapshot();
        assert_eq!(
            snapshot.rollbacks,
            RollbackCounters {
                stabilized: 1,
                did_not_stabilize: 1,
                aborted: 1,
            }
        );
        assert_eq!(snapshot.rollback_services["backend"].succeeded, 2);
        assert_eq!(snapshot.rollback_services["frontend"].failed, 1);
        assert!(!snapshot.rollback_services.contains_key("all"));
    }
}
