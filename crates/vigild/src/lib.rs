//! vigild library surface: assembles Vigil subsystems from `vigil.toml`.
//!
//! The binary in `main.rs` is a thin CLI over [`wiring::Vigil`]; the
//! integration tests build the same value against a temp directory.

pub mod wiring;

pub use wiring::Vigil;
