//! HealthEngine: runs registered probes and aggregates system health.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vigil_core::{HealthCheckResult, HealthStatus, SystemHealth};

use crate::cache::HealthCache;
use crate::probe::{Probe, ProbeError};

pub type HealthResult<T> = Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("service not registered: {0}")]
    UnknownService(String),

    #[error("service already registered: {0}")]
    DuplicateService(String),
}

/// A probe plus the policy it runs under.
#[derive(Clone)]
pub struct ProbeRegistration {
    pub name: String,
    pub timeout: Duration,
    /// Successful probes slower than this report `Degraded`.
    pub degraded_after: Duration,
    /// Critical probes gate readiness.
    pub critical: bool,
    pub probe: Arc<dyn Probe>,
}

impl ProbeRegistration {
    pub fn new(name: &str, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.to_string(),
            timeout: Duration::from_secs(5),
            degraded_after: Duration::from_secs(2),
            critical: false,
            probe,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn degraded_after(mut self, threshold: Duration) -> Self {
        self.degraded_after = threshold;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

/// Readiness over the critical probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    /// Critical services currently unhealthy.
    pub failing: Vec<String>,
}

/// Runs every registered probe concurrently and caches results per service.
pub struct HealthEngine {
    probes: Vec<ProbeRegistration>,
    cache: Mutex<HealthCache>,
    version: String,
    environment: String,
}

impl HealthEngine {
    pub fn new(version: &str, environment: &str, cache_ttl: Duration) -> Self {
        Self {
            probes: Vec::new(),
            cache: Mutex::new(HealthCache::new(cache_ttl)),
            version: version.to_string(),
            environment: environment.to_string(),
        }
    }

    /// Register a probe. Results are reported in registration order.
    pub fn register(&mut self, registration: ProbeRegistration) -> HealthResult<()> {
        if self.probes.iter().any(|p| p.name == registration.name) {
            return Err(HealthError::DuplicateService(registration.name));
        }
        debug!(
            service = %registration.name,
            timeout_ms = registration.timeout.as_millis() as u64,
            critical = registration.critical,
            "probe registered"
        );
        self.probes.push(registration);
        Ok(())
    }

    pub fn service_names(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.name.clone()).collect()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// System health, serving fresh cache entries and re-probing the rest.
    pub async fn check_health(&self) -> SystemHealth {
        self.collect(true).await
    }

    /// System health with every probe re-run, bypassing the cache.
    pub async fn check_health_fresh(&self) -> SystemHealth {
        self.collect(false).await
    }

    /// One service's result, from cache when fresh.
    pub async fn check_service(&self, name: &str) -> HealthResult<HealthCheckResult> {
        let registration = self.registration(name)?;
        let cached = self.lock_cache().get(name, Instant::now());
        if let Some(cached) = cached {
            return Ok(cached);
        }
        Ok(self.probe_and_cache(registration).await)
    }

    /// One service's result, always re-probed.
    pub async fn check_service_fresh(&self, name: &str) -> HealthResult<HealthCheckResult> {
        let registration = self.registration(name)?;
        Ok(self.probe_and_cache(registration).await)
    }

    /// Drop the cached result for one service so its next check re-probes.
    pub fn invalidate(&self, service: &str) {
        self.lock_cache().remove(service);
        debug!(%service, "health cache entry invalidated");
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
        info!("health cache cleared");
    }

    /// Ready iff no critical probe reports `Unhealthy`.
    pub async fn readiness(&self) -> Readiness {
        let health = self.check_health().await;
        let failing: Vec<String> = self
            .probes
            .iter()
            .filter(|p| p.critical)
            .filter(|p| {
                health
                    .service(&p.name)
                    .is_none_or(|r| r.status == HealthStatus::Unhealthy)
            })
            .map(|p| p.name.clone())
            .collect();
        Readiness {
            ready: failing.is_empty(),
            failing,
        }
    }

    fn registration(&self, name: &str) -> HealthResult<&ProbeRegistration> {
        self.probes
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| HealthError::UnknownService(name.to_string()))
    }

    fn lock_cache(&self) -> MutexGuard<'_, HealthCache> {
        // A poisoned cache only ever holds complete entries.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn probe_and_cache(&self, registration: &ProbeRegistration) -> HealthCheckResult {
        let result = run_probe(registration).await;
        self.lock_cache().insert(result.clone(), Instant::now());
        result
    }

    async fn collect(&self, use_cache: bool) -> SystemHealth {
        let now = Instant::now();
        let mut slots: Vec<Option<HealthCheckResult>> = if use_cache {
            let cache = self.lock_cache();
            self.probes.iter().map(|p| cache.get(&p.name, now)).collect()
        } else {
            vec![None; self.probes.len()]
        };

        let pending: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_none()).collect();
        let fresh = join_all(pending.iter().map(|&i| run_probe(&self.probes[i]))).await;

        {
            let mut cache = self.lock_cache();
            let recorded_at = Instant::now();
            for (i, result) in pending.into_iter().zip(fresh) {
                cache.insert(result.clone(), recorded_at);
                slots[i] = Some(result);
            }
        }

        let services: Vec<HealthCheckResult> = slots.into_iter().flatten().collect();
        let health = SystemHealth::from_results(services, &self.version, &self.environment);
        debug!(
            status = %health.status,
            services = health.services.len(),
            "system health collected"
        );
        health
    }
}

/// Run one probe in its own task, raced against its timeout.
///
/// The task is aborted when the timeout wins; a panic inside the probe is
/// reported as `ProbeError::Panicked`.
async fn run_probe(registration: &ProbeRegistration) -> HealthCheckResult {
    let name = registration.name.as_str();
    let probe = registration.probe.clone();
    let started = Instant::now();

    let mut handle = tokio::spawn(async move { probe.probe().await });
    let outcome = match tokio::time::timeout(registration.timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) if join_err.is_panic() => Err(ProbeError::Panicked),
        Ok(Err(_)) => Err(ProbeError::Failed("probe task cancelled".to_string())),
        Err(_) => {
            handle.abort();
            Err(ProbeError::Timeout)
        }
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(details) => {
            let mut result = HealthCheckResult::healthy(name, elapsed_ms).with_details(details);
            if started.elapsed() > registration.degraded_after {
                result.status = HealthStatus::Degraded;
                warn!(
                    service = %name,
                    elapsed_ms,
                    threshold_ms = registration.degraded_after.as_millis() as u64,
                    "probe slow, reporting degraded"
                );
            } else {
                debug!(service = %name, elapsed_ms, "probe healthy");
            }
            result
        }
        Err(e) => {
            warn!(service = %name, error = %e, elapsed_ms, "probe failed");
            let mut result = HealthCheckResult::unhealthy(name, e.to_string());
            result.response_time_ms = Some(elapsed_ms);
            result
        }
    }
}
