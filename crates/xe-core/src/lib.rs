//! Core infrastructure for oxidized-xenos
//!
//! Shared configuration, error types and logging setup used by the memory
//! and GPU crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{EmulatorError, GpuError, MemoryError, Result};
