//! Xenos GPU command processor for oxidized-xenos
//!
//! Decodes PM4 command streams written by the guest into physical memory and
//! replays them against a register file, guest memory and a pluggable
//! graphics backend.

pub mod backend;
pub mod draw;
pub mod endian;
pub mod packet;
pub mod processor;
pub mod query;
pub mod registers;
pub mod ring;
pub mod shader;
pub mod thread;
pub mod trace;
pub mod wait;

pub use backend::{GraphicsBackend, NullBackend, RecordingBackend};
pub use endian::Endian;
pub use packet::{Opcode, PacketHeader};
pub use processor::{CommandProcessor, DrainStatus, PacketOutcome, ProcessorStats};
pub use registers::RegisterFile;
pub use ring::RingCursor;
pub use thread::{GpuThread, GpuThreadState};
pub use trace::{NullTraceWriter, RecordingTraceWriter, TraceEvent, TraceWriter};
pub use wait::{ShutdownFlag, WaitHooks};
