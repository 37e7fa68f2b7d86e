//! The probe contract.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use vigil_core::Details;

/// Outcome of one probe call: optional details on success.
pub type ProbeResult = Result<Details, ProbeError>;

/// Why a probe failed. Always converted to an `Unhealthy` result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("timeout")]
    Timeout,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Failed(String),

    #[error("probe panicked")]
    Panicked,
}

/// A zero-argument reachability/latency check against one dependency.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ProbeResult> + Send,
{
    async fn probe(&self) -> ProbeResult {
        (self.0)().await
    }
}

/// Wrap an async closure as a probe.
///
/// ```ignore
/// let probe = probe_fn(|| async { Ok(Details::new()) });
/// ```
pub fn probe_fn<F, Fut>(f: F) -> Arc<dyn Probe>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeResult> + Send + 'static,
{
    Arc::new(FnProbe(f))
}
