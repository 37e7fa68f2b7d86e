//! Recovery actions and their retry loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, warn};

/// One attempt at restoring a dependency. `Ok(true)` means recovered.
#[async_trait]
pub trait RecoveryStep: Send + Sync {
    async fn attempt(&self) -> anyhow::Result<bool>;
}

struct FnStep<F>(F);

#[async_trait]
impl<F, Fut> RecoveryStep for FnStep<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn attempt(&self) -> anyhow::Result<bool> {
        (self.0)().await
    }
}

/// Wrap an async closure as a recovery step.
pub fn step_fn<F, Fut>(f: F) -> Arc<dyn RecoveryStep>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    Arc::new(FnStep(f))
}

/// A recovery step plus its retry policy.
#[derive(Clone)]
pub struct RecoveryAction {
    pub retry_count: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    pub step: Arc<dyn RecoveryStep>,
}

/// What one recovery sequence achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub recovered: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl RecoveryAction {
    pub fn new(retry_count: u32, retry_delay: Duration, step: Arc<dyn RecoveryStep>) -> Self {
        Self {
            retry_count,
            retry_delay,
            step,
        }
    }

    /// Run the step until it succeeds or `retry_count` attempts are spent.
    ///
    /// Errors and panics from the step count as failed attempts.
    pub async fn execute(&self, service: &str) -> AttemptOutcome {
        let max = self.retry_count.max(1);
        let mut last_error = None;

        for attempt in 1..=max {
            let outcome = AssertUnwindSafe(self.step.attempt()).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(true)) => {
                    info!(%service, attempt, "recovery attempt succeeded");
                    return AttemptOutcome {
                        recovered: true,
                        attempts: attempt,
                        last_error: None,
                    };
                }
                Ok(Ok(false)) => "recovery action reported failure".to_string(),
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => "recovery action panicked".to_string(),
            };
            warn!(%service, attempt, max, error = %failure, "recovery attempt failed");
            last_error = Some(failure);

            if attempt < max {
                debug!(%service, delay_ms = self.retry_delay.as_millis() as u64, "waiting before next attempt");
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        AttemptOutcome {
            recovered: false,
            attempts: max,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn succeed_on(n: u32, calls: Arc<AtomicU32>) -> Arc<dyn RecoveryStep> {
        step_fn(move || {
            let calls = calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1 >= n) }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_second_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let action = RecoveryAction::new(3, Duration::from_secs(5), succeed_on(2, calls.clone()));

        let started = Instant::now();
        let outcome = action.execute("database").await;
        assert_eq!(
            outcome,
            AttemptOutcome {
                recovered: true,
                attempts: 2,
                last_error: None
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_without_trailing_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let action = RecoveryAction::new(3, Duration::from_secs(5), succeed_on(99, calls.clone()));

        let started = Instant::now();
        let outcome = action.execute("cache").await;
        assert!(!outcome.recovered);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.last_error.as_deref(),
            Some("recovery action reported failure")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
    }

    async fn flaky_then_panics(calls: Arc<AtomicU32>) -> anyhow::Result<bool> {
        match calls.fetch_add(1, Ordering::SeqCst) {
            0 => anyhow::bail!("connection reset by peer"),
            1 => panic!("driver bug"),
            _ => Ok(true),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn errors_and_panics_count_as_failed_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let step = {
            let calls = calls.clone();
            step_fn(move || flaky_then_panics(calls.clone()))
        };
        let action = RecoveryAction::new(3, Duration::from_millis(10), step);

        let outcome = action.execute("payments").await;
        assert!(outcome.recovered);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn last_error_message_is_kept() {
        let action = RecoveryAction::new(
            1,
            Duration::ZERO,
            step_fn(|| async { Err(anyhow::anyhow!("smtp auth rejected")) }),
        );
        let outcome = action.execute("mail").await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.last_error.as_deref(), Some("smtp auth rejected"));
    }
}
