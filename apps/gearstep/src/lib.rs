//! # gearstep
//!
//! The async layer around `gearstep-core`: search strategies and their
//! backends, concurrent consolidation, the configuration flow, the session
//! store, the HTTP API and the CLI.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod flow;
pub mod runtime;
pub mod search;
pub mod session;

// Re-export gearstep_core for convenience
pub use gearstep_core;
