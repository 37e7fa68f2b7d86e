//! vigil-state: durable state for the Vigil control plane.
//!
//! Deployment snapshots and audit records are stored as one JSON document
//! per file under two logical stores:
//!
//! ```text
//! <data_dir>/
//!   snapshots/<snapshot-id>.json
//!   logs/<kind>-<millis>.json
//! ```
//!
//! Both stores are append-only: writing an id that already exists fails.
//! Ids are timestamp-derived and sort in creation order, so listing a
//! directory and sorting by file name yields chronological order.
//!
//! The `FileStore` is `Clone` + `Send` + `Sync` and implements
//! `vigil_core::AuditLog`.

pub mod error;
pub mod store;

pub use error::{StateError, StateResult};
pub use store::FileStore;
