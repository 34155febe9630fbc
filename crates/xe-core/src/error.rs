//! Error types for oxidized-xenos

use thiserror::Error;

/// Top-level emulator error
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Guest memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Physical memory size 0x{0:X} is not a power of two between 4 KiB and 512 MiB")]
    InvalidSize(u64),

    #[error("Access of {size} bytes at 0x{address:08X} crosses the end of physical memory")]
    OutOfRange { address: u32, size: usize },

    #[error("Ring region at 0x{base:08X} with capacity 0x{capacity:X} is not word sized")]
    InvalidRing { base: u32, capacity: u32 },
}

/// Command processor faults
///
/// Every variant is recoverable: the dispatch loop logs it and carries on with
/// the next packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("Unimplemented PM4 opcode 0x{opcode:02X} (count {count})")]
    UnknownOpcode { opcode: u32, count: u32 },

    #[error("Packet needs 0x{needed:X} bytes but only 0x{available:X} remain")]
    CountOverflow { needed: u32, available: u32 },

    #[error("{0}: packet too small")]
    PacketTooSmall(&'static str),

    #[error("Register index 0x{0:04X} out of range")]
    RegisterOutOfRange(u32),

    #[error("Unsupported draw source select {0}")]
    UnsupportedSourceSelect(u32),

    #[error("Unsupported shader stage {0}")]
    UnsupportedShaderStage(u32),

    #[error("Inline shader of {size} dwords does not fit a {available} dword payload")]
    ShaderTooLarge { size: u32, available: u32 },

    #[error("EVENT_WRITE with a {0} dword payload is unsupported")]
    MalformedEventWrite(u32),

    #[error("Indirect buffer nesting exceeds {0} levels")]
    IndirectDepthExceeded(u32),

    #[error("Primary ring buffer is not initialized")]
    RingNotInitialized,

    #[error("Backend rejected draw: {0}")]
    Backend(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GpuError::UnknownOpcode { opcode: 0x7A, count: 3 };
        assert_eq!(err.to_string(), "Unimplemented PM4 opcode 0x7A (count 3)");

        let err = EmulatorError::from(GpuError::IndirectDepthExceeded(16));
        assert_eq!(err.to_string(), "GPU error: Indirect buffer nesting exceeds 16 levels");
    }

    #[test]
    fn test_memory_error_conversion() {
        let err: GpuError = MemoryError::OutOfRange { address: 0x1FFF_FFFE, size: 4 }.into();
        assert!(matches!(err, GpuError::Memory(MemoryError::OutOfRange { .. })));
    }
}
