//! Guest memory for oxidized-xenos
//!
//! Physical memory shared between the emulated CPU (the command producer) and
//! the GPU command processor, plus the mapping between the CPU and GPU views
//! of guest addresses.

pub mod constants;
pub mod manager;

pub use manager::{AddressTranslator, MemoryManager};
pub use xe_core::error::MemoryError;
