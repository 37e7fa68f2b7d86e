//! Per-service TTL cache of probe results.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use vigil_core::HealthCheckResult;

/// Latest result per service, valid for `ttl` after it was recorded.
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    entries: HashMap<String, (Instant, HealthCheckResult)>,
}

impl HealthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// The cached result if it is still fresh at `now`.
    pub fn get(&self, service: &str, now: Instant) -> Option<HealthCheckResult> {
        self.entries
            .get(service)
            .filter(|(at, _)| now.duration_since(*at) < self.ttl)
            .map(|(_, result)| result.clone())
    }

    /// Replace the entry for the result's service.
    pub fn insert(&mut self, result: HealthCheckResult, now: Instant) {
        self.entries.insert(result.service.clone(), (now, result));
    }

    pub fn remove(&mut self, service: &str) {
        self.entries.remove(service);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_expires_after_ttl() {
        let mut cache = HealthCache::new(Duration::from_secs(30));
        let t0 = Instant::now();
        cache.insert(HealthCheckResult::healthy("cache", 3), t0);

        assert!(cache.get("cache", t0 + Duration::from_secs(29)).is_some());
        assert!(cache.get("cache", t0 + Duration::from_secs(30)).is_none());
        assert!(cache.get("database", t0).is_none());
    }

    #[test]
    fn insert_replaces_previous_result() {
        let mut cache = HealthCache::new(Duration::from_secs(30));
        let t0 = Instant::now();
        cache.insert(HealthCheckResult::healthy("cache", 3), t0);
        cache.insert(HealthCheckResult::unhealthy("cache", "timeout"), t0);

        let entry = cache.get("cache", t0).unwrap();
        assert_eq!(entry.error.as_deref(), Some("timeout"));
        assert!(entry.response_time_ms.is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut cache = HealthCache::new(Duration::from_secs(30));
        let t0 = Instant::now();
        cache.insert(HealthCheckResult::healthy("cache", 3), t0);
        cache.insert(HealthCheckResult::healthy("database", 3), t0);
        cache.remove("cache");
        assert!(cache.get("cache", t0).is_none());
        assert!(cache.get("database", t0).is_some());
        cache.clear();
        assert!(cache.get("database", t0).is_none());
    }
}
