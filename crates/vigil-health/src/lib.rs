//! vigil-health: the health probe engine.
//!
//! Runs one probe per registered dependency, each in its own task with its
//! own timeout, and folds the results into a `SystemHealth`.
//!
//! # Architecture
//!
//! ```text
//! HealthEngine
//!   ├── ProbeRegistration (name, timeout, degraded threshold, critical)
//!   │   └── Arc<dyn Probe>  (HttpProbe, TcpProbe, CommandProbe, probe_fn)
//!   ├── HealthCache (per-service TTL)
//!   └── check_health() → fan-out / join → SystemHealth
//! ```
//!
//! # Failure isolation
//!
//! A probe that errors, panics, or overruns its timeout yields an
//! `Unhealthy` result for its own service only. Nothing raised by a probe
//! reaches the caller of `check_health()`.

pub mod cache;
pub mod engine;
pub mod probe;
pub mod probes;

pub use cache::HealthCache;
pub use engine::{HealthEngine, HealthError, HealthResult, ProbeRegistration, Readiness};
pub use probe::{Probe, ProbeError, ProbeResult, probe_fn};
pub use probes::{CommandProbe, HttpProbe, TcpProbe};
