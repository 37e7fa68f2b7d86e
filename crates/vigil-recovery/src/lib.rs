//! vigil-recovery: automated recovery of unhealthy dependencies.
//!
//! # Components
//!
//! - **`action`**: a recovery step plus its retry policy
//! - **`throttle`**: per-service notification cooldown
//! - **`orchestrator`**: maps unhealthy services to actions, one sequence
//!   per service at a time, notifies and audits each sequence
//! - **`sweep`**: explicitly started/stopped periodic recovery task
//!
//! Expected failures (a dependency still down, an action that keeps
//! failing, a concurrent request) come back as `RecoveryResult` fields;
//! nothing in this crate returns an error to its caller.

pub mod action;
pub mod orchestrator;
pub mod sweep;
pub mod throttle;

pub use action::{AttemptOutcome, RecoveryAction, RecoveryStep, step_fn};
pub use orchestrator::{ALREADY_IN_PROGRESS, NO_ACTION_DEFINED, RecoveryOrchestrator};
pub use sweep::AutoRecovery;
pub use throttle::NotificationThrottle;
