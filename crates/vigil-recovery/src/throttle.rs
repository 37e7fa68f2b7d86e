//! Per-service notification cooldown.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Allows at most one notification per service per cooldown window.
#[derive(Debug)]
pub struct NotificationThrottle {
    cooldown: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl NotificationThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the notification slot for `service`. Returns false while the
    /// previous notification is still inside the window.
    pub fn try_acquire(&self, service: &str) -> bool {
        let now = Instant::now();
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(at) = last_sent.get(service)
            && now.duration_since(*at) < self.cooldown
        {
            return false;
        }
        last_sent.insert(service.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn suppresses_within_window() {
        let throttle = NotificationThrottle::new(Duration::from_secs(3600));
        assert!(throttle.try_acquire("payments"));
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(!throttle.try_acquire("payments"));
        tokio::time::advance(Duration::from_secs(3000)).await;
        assert!(throttle.try_acquire("payments"));
    }

    #[tokio::test(start_paused = true)]
    async fn windows_are_per_service() {
        let throttle = NotificationThrottle::new(Duration::from_secs(3600));
        assert!(throttle.try_acquire("payments"));
        assert!(throttle.try_acquire("cache"));
        assert!(!throttle.try_acquire("cache"));
    }
}
