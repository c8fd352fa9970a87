//! Phosphor Common Utilities
//!
//! Shared infrastructure for all Phosphor crates:
//! - Error types and result aliases
//! - Timing utilities (sampling rate control, rolling throughput windows)
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod timing;

pub use config::*;
pub use error::*;
pub use timing::*;
