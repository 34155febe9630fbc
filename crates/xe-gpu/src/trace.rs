//! Command stream trace sink
//!
//! The command processor reports packet boundaries and the guest memory it
//! touches so a trace can be replayed offline. Sinks only observe; nothing
//! they do feeds back into execution.

use std::sync::Arc;

use parking_lot::Mutex;

/// Receiver of command stream trace events
pub trait TraceWriter: Send {
    /// A packet starting at `address` spanning `word_count` words
    fn packet_start(&mut self, address: u32, word_count: u32);
    /// End of the most recently started packet
    fn packet_end(&mut self);
    /// Guest memory read by a packet
    fn memory_read(&mut self, address: u32, size: u32);
    /// Guest memory written by a packet
    fn memory_write(&mut self, address: u32, size: u32);
    /// Entry into an indirect buffer of `size` bytes
    fn indirect_buffer_start(&mut self, address: u32, size: u32);
    /// Return from the innermost indirect buffer
    fn indirect_buffer_end(&mut self);
}

/// Trace writer that drops everything
#[derive(Debug, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn packet_start(&mut self, _address: u32, _word_count: u32) {}
    fn packet_end(&mut self) {}
    fn memory_read(&mut self, _address: u32, _size: u32) {}
    fn memory_write(&mut self, _address: u32, _size: u32) {}
    fn indirect_buffer_start(&mut self, _address: u32, _size: u32) {}
    fn indirect_buffer_end(&mut self) {}
}

/// Recorded trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    PacketStart { address: u32, word_count: u32 },
    PacketEnd,
    MemoryRead { address: u32, size: u32 },
    MemoryWrite { address: u32, size: u32 },
    IndirectBufferStart { address: u32, size: u32 },
    IndirectBufferEnd,
}

/// Trace writer keeping events in memory
///
/// Clones share the same event list, so a handle kept by the caller sees what
/// the command processor recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingTraceWriter {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl RecordingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Number of packets started so far
    pub fn packet_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, TraceEvent::PacketStart { .. }))
            .count()
    }

    fn push(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

impl TraceWriter for RecordingTraceWriter {
    fn packet_start(&mut self, address: u32, word_count: u32) {
        self.push(TraceEvent::PacketStart { address, word_count });
    }

    fn packet_end(&mut self) {
        self.push(TraceEvent::PacketEnd);
    }

    fn memory_read(&mut self, address: u32, size: u32) {
        self.push(TraceEvent::MemoryRead { address, size });
    }

    fn memory_write(&mut self, address: u32, size: u32) {
        self.push(TraceEvent::MemoryWrite { address, size });
    }

    fn indirect_buffer_start(&mut self, address: u32, size: u32) {
        self.push(TraceEvent::IndirectBufferStart { address, size });
    }

    fn indirect_buffer_end(&mut self) {
        self.push(TraceEvent::IndirectBufferEnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_handle_shares_events() {
        let handle = RecordingTraceWriter::new();
        let mut writer: Box<dyn TraceWriter> = Box::new(handle.clone());

        writer.packet_start(0x100, 3);
        writer.memory_write(0x2000, 4);
        writer.packet_end();

        assert_eq!(
            handle.events(),
            vec![
                TraceEvent::PacketStart { address: 0x100, word_count: 3 },
                TraceEvent::MemoryWrite { address: 0x2000, size: 4 },
                TraceEvent::PacketEnd,
            ]
        );
        assert_eq!(handle.packet_count(), 1);
    }
}
