//! RecoveryOrchestrator: turns unhealthy services into recovery sequences.
//!
//! Owns the two pieces of mutable recovery state: the set of services with
//! a sequence in flight, and the per-service notification cooldown.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use vigil_core::{
    Alert, AuditLog, AuditRecord, NotificationSink, RecoveryRecord, RecoveryResult, Severity,
    epoch_millis, next_id,
};
use vigil_health::HealthEngine;
use vigil_metrics::MetricsCollector;

use crate::action::RecoveryAction;
use crate::throttle::NotificationThrottle;

pub const NO_ACTION_DEFINED: &str = "no recovery action defined";
pub const ALREADY_IN_PROGRESS: &str = "Recovery already in progress";

/// Marks a service as recovering; cleared on drop, including cancellation.
struct InProgressGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    service: String,
}

impl<'a> InProgressGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, service: &str) -> Option<Self> {
        let mut active = set.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(service.to_string()) {
            return None;
        }
        Some(Self {
            set,
            service: service.to_string(),
        })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.set.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.service);
    }
}

pub struct RecoveryOrchestrator {
    health: Arc<HealthEngine>,
    actions: HashMap<String, RecoveryAction>,
    in_progress: Mutex<HashSet<String>>,
    throttle: NotificationThrottle,
    notifier: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditLog>,
    metrics: Arc<MetricsCollector>,
}

impl RecoveryOrchestrator {
    pub fn new(
        health: Arc<HealthEngine>,
        notifier: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditLog>,
        cooldown: Duration,
    ) -> Self {
        Self {
            health,
            actions: HashMap::new(),
            in_progress: Mutex::new(HashSet::new()),
            throttle: NotificationThrottle::new(cooldown),
            notifier,
            audit,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Share a collector with the rest of the process.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register (or replace) the recovery action for a service.
    pub fn register_action(&mut self, service: &str, action: RecoveryAction) {
        debug!(
            %service,
            retry_count = action.retry_count,
            retry_delay_ms = action.retry_delay.as_millis() as u64,
            "recovery action registered"
        );
        self.actions.insert(service.to_string(), action);
    }

    pub fn registered_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.actions.keys().cloned().collect();
        services.sort();
        services
    }

    /// Services with a recovery sequence currently running.
    pub fn in_progress(&self) -> Vec<String> {
        let active = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        let mut services: Vec<String> = active.iter().cloned().collect();
        services.sort();
        services
    }

    /// Recover every service the health engine reports `Unhealthy`.
    ///
    /// Sequences for different services run concurrently.
    pub async fn recover_failed_services(&self) -> Vec<RecoveryResult> {
        let health = self.health.check_health().await;
        let failed = health.unhealthy_services();
        if failed.is_empty() {
            debug!("no unhealthy services to recover");
            return Vec::new();
        }

        info!(services = ?failed, "recovering unhealthy services");
        join_all(failed.iter().map(|s| self.recover_specific_service(s))).await
    }

    /// Run the recovery sequence for one service.
    pub async fn recover_specific_service(&self, service: &str) -> RecoveryResult {
        let Some(action) = self.actions.get(service) else {
            debug!(%service, "no recovery action registered");
            return RecoveryResult::skipped(service, NO_ACTION_DEFINED);
        };

        let Some(_guard) = InProgressGuard::acquire(&self.in_progress, service) else {
            info!(%service, "recovery already in progress, skipping");
            return RecoveryResult::skipped(service, ALREADY_IN_PROGRESS);
        };

        info!(%service, retry_count = action.retry_count, "starting recovery");
        let outcome = action.execute(service).await;
        self.health.invalidate(service);

        let result = RecoveryResult {
            service: service.to_string(),
            recovered: outcome.recovered,
            attempts: outcome.attempts,
            error: outcome.last_error.filter(|_| !outcome.recovered),
            timestamp: epoch_millis(),
        };

        if result.recovered {
            info!(%service, attempts = result.attempts, "service recovered");
        } else {
            warn!(%service, attempts = result.attempts, error = ?result.error, "recovery exhausted");
        }

        self.metrics.record_recovery(&result);
        self.notify(&result).await;
        self.record(&result).await;
        result
    }

    async fn notify(&self, result: &RecoveryResult) {
        if !self.throttle.try_acquire(&result.service) {
            debug!(service = %result.service, "notification suppressed by cooldown");
            return;
        }

        let alert = if result.recovered {
            Alert::new(format!("Service recovered: {}", result.service), Severity::Info)
        } else {
            Alert::new(
                format!("Service recovery failed: {}", result.service),
                Severity::Critical,
            )
        }
        .for_service(&result.service)
        .detail("attempts", result.attempts)
        .detail("recovered", result.recovered);
        let alert = match &result.error {
            Some(error) => alert.detail("error", error.as_str()),
            None => alert,
        };

        if let Err(e) = self.notifier.notify(&alert).await {
            warn!(service = %result.service, error = %e, "failed to send recovery notification");
        }
    }

    async fn record(&self, result: &RecoveryResult) {
        let record = AuditRecord::Recovery(RecoveryRecord {
            id: next_id("recovery"),
            result: result.clone(),
        });
        if let Err(e) = self.audit.append(&record).await {
            warn!(service = %result.service, error = %e, "failed to append recovery audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use vigil_core::{Details, HealthStatus};
    use vigil_health::{ProbeError, ProbeRegistration, probe_fn};

    use super::*;
    use crate::action::step_fn;

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<Alert>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn alerts(&self) -> Vec<Alert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingNotifier {
        async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            if self.fail {
                anyhow::bail!("webhook returned 500");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryAudit {
        records: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditLog for MemoryAudit {
        async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    /// A probe whose health is flipped by the test.
    fn switchable(name: &str, up: Arc<AtomicBool>) -> ProbeRegistration {
        ProbeRegistration::new(
            name,
            probe_fn(move || {
                let up = up.clone();
                async move {
                    if up.load(Ordering::SeqCst) {
                        Ok(Details::new())
                    } else {
                        Err(ProbeError::Unreachable("connection refused".to_string()))
                    }
                }
            }),
        )
    }

    struct Fixture {
        orchestrator: RecoveryOrchestrator,
        notifier: Arc<RecordingNotifier>,
        audit: Arc<MemoryAudit>,
    }

    fn fixture(probes: Vec<ProbeRegistration>, notifier: RecordingNotifier) -> Fixture {
        let mut engine = HealthEngine::new("1.0.0", "test", Duration::from_secs(30));
        for probe in probes {
            engine.register(probe).unwrap();
        }
        let notifier = Arc::new(notifier);
        let audit = Arc::new(MemoryAudit::default());
        let orchestrator = RecoveryOrchestrator::new(
            Arc::new(engine),
            notifier.clone(),
            audit.clone(),
            Duration::from_secs(3600),
        );
        Fixture {
            orchestrator,
            notifier,
            audit,
        }
    }

    fn failing_action(calls: Arc<AtomicU32>) -> RecoveryAction {
        RecoveryAction::new(
            3,
            Duration::from_secs(5),
            step_fn(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                }
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_database_on_second_attempt() {
        let mut fx = fixture(Vec::new(), RecordingNotifier::default());
        let calls = Arc::new(AtomicU32::new(0));
        let step_calls = calls.clone();
        fx.orchestrator.register_action(
            "database",
            RecoveryAction::new(
                3,
                Duration::from_secs(5),
                step_fn(move || {
                    let calls = step_calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            anyhow::bail!("connection refused");
                        }
                        Ok(true)
                    }
                }),
            ),
        );

        let result = fx.orchestrator.recover_specific_service("database").await;
        assert_eq!(result.service, "database");
        assert!(result.recovered);
        assert_eq!(result.attempts, 2);
        assert!(result.error.is_none());

        let alerts = fx.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(fx.audit.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_service_is_a_normal_outcome() {
        let fx = fixture(Vec::new(), RecordingNotifier::default());
        let result = fx.orchestrator.recover_specific_service("search").await;
        assert!(!result.recovered);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.error.as_deref(), Some(NO_ACTION_DEFINED));
        assert!(fx.notifier.alerts().is_empty());
        assert!(fx.audit.records.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_request_for_same_service_is_rejected() {
        let mut fx = fixture(Vec::new(), RecordingNotifier::default());
        let calls = Arc::new(AtomicU32::new(0));
        let step_calls = calls.clone();
        fx.orchestrator.register_action(
            "cache",
            RecoveryAction::new(
                3,
                Duration::from_secs(1),
                step_fn(move || {
                    let calls = step_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok(true)
                    }
                }),
            ),
        );

        let orchestrator = &fx.orchestrator;
        let (first, second) = tokio::join!(orchestrator.recover_specific_service("cache"), async {
            tokio::task::yield_now().await;
            assert_eq!(orchestrator.in_progress(), vec!["cache".to_string()]);
            orchestrator.recover_specific_service("cache").await
        });

        assert!(first.recovered);
        assert!(!second.recovered);
        assert_eq!(second.attempts, 0);
        assert_eq!(second.error.as_deref(), Some(ALREADY_IN_PROGRESS));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Guard released once the first sequence finished.
        assert!(orchestrator.in_progress().is_empty());
        let third = orchestrator.recover_specific_service("cache").await;
        assert!(third.recovered);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_only_targets_unhealthy_services() {
        let db_up = Arc::new(AtomicBool::new(true));
        let cache_up = Arc::new(AtomicBool::new(false));
        let search_up = Arc::new(AtomicBool::new(false));
        let mut fx = fixture(
            vec![
                switchable("database", db_up),
                switchable("cache", cache_up.clone()),
                switchable("search", search_up),
            ],
            RecordingNotifier::default(),
        );
        let db_calls = Arc::new(AtomicU32::new(0));
        fx.orchestrator
            .register_action("database", failing_action(db_calls.clone()));
        let up = cache_up.clone();
        fx.orchestrator.register_action(
            "cache",
            RecoveryAction::new(
                2,
                Duration::from_secs(1),
                step_fn(move || {
                    let up = up.clone();
                    async move {
                        up.store(true, Ordering::SeqCst);
                        Ok(true)
                    }
                }),
            ),
        );

        let mut results = fx.orchestrator.recover_failed_services().await;
        results.sort_by(|a, b| a.service.cmp(&b.service));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].service, "cache");
        assert!(results[0].recovered);
        assert_eq!(results[1].service, "search");
        assert_eq!(results[1].error.as_deref(), Some(NO_ACTION_DEFINED));
        assert_eq!(db_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_service_is_not_recovered_again() {
        let cache_up = Arc::new(AtomicBool::new(false));
        let mut fx = fixture(
            vec![switchable("cache", cache_up.clone())],
            RecordingNotifier::default(),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let step_calls = calls.clone();
        fx.orchestrator.register_action(
            "cache",
            RecoveryAction::new(
                3,
                Duration::from_secs(1),
                step_fn(move || {
                    let up = cache_up.clone();
                    let calls = step_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        up.store(true, Ordering::SeqCst);
                        Ok(true)
                    }
                }),
            ),
        );

        let first = fx.orchestrator.recover_failed_services().await;
        assert_eq!(first.len(), 1);
        assert!(first[0].recovered);

        // The stale unhealthy entry is gone well inside the 30s TTL.
        let health = fx.orchestrator.health.check_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(fx.orchestrator.recover_failed_services().await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counters = fx.orchestrator.metrics.snapshot().recovery["cache"];
        assert_eq!((counters.attempts, counters.recovered), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_suppresses_repeat_notifications() {
        let payments_up = Arc::new(AtomicBool::new(false));
        let mut fx = fixture(
            vec![switchable("payments", payments_up)],
            RecordingNotifier::default(),
        );
        let calls = Arc::new(AtomicU32::new(0));
        fx.orchestrator
            .register_action("payments", failing_action(calls.clone()));

        let first = fx.orchestrator.recover_failed_services().await;
        assert_eq!(first.len(), 1);
        assert!(!first[0].recovered);
        assert_eq!(first[0].attempts, 3);

        tokio::time::advance(Duration::from_secs(600)).await;
        let second = fx.orchestrator.recover_failed_services().await;
        assert_eq!(second.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        let alerts = fx.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].service.as_deref(), Some("payments"));
        // Both sequences are still audited.
        assert_eq!(fx.audit.records.lock().unwrap().len(), 2);

        tokio::time::advance(Duration::from_secs(3600)).await;
        fx.orchestrator.recover_failed_services().await;
        assert_eq!(fx.notifier.alerts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn notifier_failure_does_not_change_result() {
        let mut fx = fixture(
            Vec::new(),
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        fx.orchestrator.register_action(
            "mail",
            RecoveryAction::new(1, Duration::ZERO, step_fn(|| async { Ok(true) })),
        );

        let result = fx.orchestrator.recover_specific_service("mail").await;
        assert!(result.recovered);
        assert_eq!(fx.notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn healthy_system_needs_no_recovery() {
        let fx = fixture(
            vec![switchable("database", Arc::new(AtomicBool::new(true)))],
            RecordingNotifier::default(),
        );
        assert!(fx.orchestrator.recover_failed_services().await.is_empty());
        let health = fx.orchestrator.health.check_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn registered_services_are_sorted() {
        let mut fx = fixture(Vec::new(), RecordingNotifier::default());
        let calls = Arc::new(AtomicU32::new(0));
        fx.orchestrator.register_action("payments", failing_action(calls.clone()));
        fx.orchestrator.register_action("cache", failing_action(calls));
        assert_eq!(
            fx.orchestrator.registered_services(),
            vec!["cache".to_string(), "payments".to_string()]
        );
    }
}
