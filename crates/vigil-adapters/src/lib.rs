//! vigil-adapters: concrete implementations of the Vigil adapter traits.
//!
//! # Components
//!
//! - **`command`**: `sh -c` runner with `{placeholder}` templates
//! - **`control`**: compute, static-site and database adapters driven by
//!   operator-configured command templates
//! - **`notify`**: tracing, webhook and fan-out notification sinks

pub mod command;
pub mod control;
pub mod notify;

pub use command::{render, run_command};
pub use control::{CommandCompute, CommandDatabase, CommandStaticSite};
pub use notify::{FanoutNotifier, TracingNotifier, WebhookNotifier};
