//! PM4 command processor
//!
//! Drains command words from guest memory, decodes them into packets and
//! applies their effects to the register file, guest memory and the graphics
//! backend. Indirect buffers are walked with an explicit stack of saved
//! cursors, so nesting depth is bounded by configuration rather than by the
//! host stack.

mod draw;
mod sync;
mod type3;

use std::sync::Arc;

use xe_core::config::GpuConfig;
use xe_core::error::{GpuError, MemoryError};
use xe_core::gpu_trace;
use xe_memory::{AddressTranslator, MemoryManager};

use crate::backend::GraphicsBackend;
use crate::endian::Endian;
use crate::packet::{PacketHeader, PACKET_BAD_FOOD, PACKET_UNINITIALIZED};
use crate::registers::{reg, RegisterFile, COHER_STATUS_PENDING};
use crate::ring::RingCursor;
use crate::shader::{Shader, ShaderCache, ShaderStage};
use crate::trace::{NullTraceWriter, TraceWriter};
use crate::wait::{NoWaitHooks, ShutdownFlag, WaitHooks};

/// Result of decoding one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Packet applied
    Executed,
    /// Predicated packet whose payload was skipped
    Skipped,
    /// Empty or terminal marker word
    Ignored,
    /// Packet fault, payload consumed
    Failed,
    /// Declared size runs past the extent, nothing consumed
    Overflow,
    /// Shutdown observed inside a wait
    Cancelled,
    /// Packet names an indirect buffer to execute next
    Indirect { address: u32, words: u32 },
}

/// How a drain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every pending word was consumed
    Completed,
    /// A packet overflowed the outermost extent
    Overflow,
    /// Shutdown interrupted a wait
    Cancelled,
}

/// Control flow requested by a type-3 handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Indirect { address: u32, words: u32 },
    Cancelled,
}

/// Packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub packets: u64,
    pub skipped: u64,
    pub ignored: u64,
    pub failed: u64,
    pub overflows: u64,
    pub indirect_buffers: u64,
}

/// Primary ring location
#[derive(Debug, Clone, Copy)]
struct PrimaryRing {
    base: u32,
    capacity: u32,
}

/// Xenos command processor
pub struct CommandProcessor {
    memory: Arc<MemoryManager>,
    regs: RegisterFile,
    config: GpuConfig,
    backend: Box<dyn GraphicsBackend>,
    trace: Box<dyn TraceWriter>,
    hooks: Arc<dyn WaitHooks>,
    shutdown: ShutdownFlag,

    primary: Option<PrimaryRing>,

    bin_mask: u64,
    bin_select: u64,
    /// Frames presented, written by EVENT_WRITE_SHD
    frame_counter: u32,
    /// Micro-engine image from ME_INIT
    me_bin: Vec<u32>,

    shaders: ShaderCache,
    active_vertex_shader: Option<Arc<Shader>>,
    active_pixel_shader: Option<Arc<Shader>>,

    stats: ProcessorStats,
}

impl CommandProcessor {
    /// Create a command processor with a null trace writer and no wait hooks
    pub fn new(
        memory: Arc<MemoryManager>,
        backend: Box<dyn GraphicsBackend>,
        config: GpuConfig,
    ) -> Self {
        Self {
            memory,
            regs: RegisterFile::new(),
            config,
            backend,
            trace: Box::new(NullTraceWriter),
            hooks: Arc::new(NoWaitHooks),
            shutdown: ShutdownFlag::new(),
            primary: None,
            bin_mask: u64::MAX,
            bin_select: u64::MAX,
            frame_counter: 0,
            me_bin: Vec::new(),
            shaders: ShaderCache::new(),
            active_vertex_shader: None,
            active_pixel_shader: None,
            stats: ProcessorStats::default(),
        }
    }

    /// Replace the trace writer
    pub fn with_trace_writer(mut self, trace: Box<dyn TraceWriter>) -> Self {
        self.trace = trace;
        self
    }

    /// Replace the wait hooks
    pub fn with_wait_hooks(mut self, hooks: Arc<dyn WaitHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Share an existing shutdown flag
    pub fn with_shutdown_flag(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Flag that cancels blocking waits
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    pub fn bin_mask(&self) -> u64 {
        self.bin_mask
    }

    pub fn bin_select(&self) -> u64 {
        self.bin_select
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub fn me_bin(&self) -> &[u32] {
        &self.me_bin
    }

    /// Currently active shader for a stage
    pub fn active_shader(&self, stage: ShaderStage) -> Option<&Arc<Shader>> {
        match stage {
            ShaderStage::Vertex => self.active_vertex_shader.as_ref(),
            ShaderStage::Pixel => self.active_pixel_shader.as_ref(),
        }
    }

    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shaders
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Primary ring size in words, once initialized
    pub fn ring_words(&self) -> Option<u32> {
        self.primary.map(|ring| ring.capacity / 4)
    }

    /// Set up the primary ring at `base` holding `2^(size_log2 + 3)` bytes
    pub fn initialize_ring(&mut self, base: u32, size_log2: u32) -> Result<(), GpuError> {
        let capacity = 1u32
            .checked_shl(size_log2.saturating_add(3))
            .ok_or(MemoryError::InvalidRing { base, capacity: 0 })?;
        // Validate the region up front
        RingCursor::new(Arc::clone(&self.memory), base, capacity)?;

        tracing::info!("Primary ring at 0x{:08X}, 0x{:X} bytes", base, capacity);
        self.primary = Some(PrimaryRing { base, capacity });
        Ok(())
    }

    /// Drain the primary ring from `read_index` up to `write_index` (in words)
    ///
    /// Returns the read index to resume from.
    pub fn execute_primary_buffer(
        &mut self,
        read_index: u32,
        write_index: u32,
    ) -> Result<u32, GpuError> {
        let ring = self.primary.ok_or(GpuError::RingNotInitialized)?;
        let mut cursor = RingCursor::with_offsets(
            Arc::clone(&self.memory),
            ring.base,
            ring.capacity,
            0,
            write_index.wrapping_mul(4),
        )?;
        cursor.set_read_offset(read_index.wrapping_mul(4));
        if cursor.read_count() == 0 {
            return Ok(read_index);
        }

        let (status, cursor) = self.drain(cursor);
        if status != DrainStatus::Completed {
            tracing::warn!("Primary ring drain ended early: {:?}", status);
        }
        Ok(cursor.read_offset() / 4)
    }

    /// Execute `word_count` command words at the CPU address `address`
    pub fn execute_indirect_buffer(
        &mut self,
        address: u32,
        word_count: u32,
    ) -> Result<DrainStatus, GpuError> {
        let size = word_count.saturating_mul(4);
        self.trace.indirect_buffer_start(address, size);
        if word_count == 0 {
            self.trace.indirect_buffer_end();
            return Ok(DrainStatus::Completed);
        }

        let cursor = match RingCursor::new(Arc::clone(&self.memory), address, size) {
            Ok(cursor) => cursor,
            Err(e) => {
                self.trace.indirect_buffer_end();
                return Err(e.into());
            }
        };

        let (status, _) = self.drain(cursor);
        self.trace.indirect_buffer_end();
        Ok(status)
    }

    /// Run the decode loop until the extent and every nested buffer are done
    fn drain(&mut self, mut cursor: RingCursor) -> (DrainStatus, RingCursor) {
        let mut stack: Vec<RingCursor> = Vec::new();

        loop {
            if cursor.read_count() == 0 {
                match stack.pop() {
                    Some(outer) => {
                        self.leave_indirect_buffer();
                        cursor = outer;
                        continue;
                    }
                    None => return (DrainStatus::Completed, cursor),
                }
            }

            match self.execute_packet(&mut cursor) {
                PacketOutcome::Executed | PacketOutcome::Skipped | PacketOutcome::Ignored => {}
                PacketOutcome::Failed => {
                    if !stack.is_empty() {
                        tracing::error!("Indirect buffer: failed to execute packet");
                    }
                }
                PacketOutcome::Overflow => match stack.pop() {
                    Some(outer) => {
                        self.leave_indirect_buffer();
                        cursor = outer;
                    }
                    None => return (DrainStatus::Overflow, cursor),
                },
                PacketOutcome::Cancelled => {
                    while let Some(outer) = stack.pop() {
                        self.leave_indirect_buffer();
                        cursor = outer;
                    }
                    return (DrainStatus::Cancelled, cursor);
                }
                PacketOutcome::Indirect { address, words } => {
                    if let Some(inner) = self.enter_indirect_buffer(stack.len(), address, words) {
                        stack.push(std::mem::replace(&mut cursor, inner));
                    }
                }
            }
        }
    }

    /// Open a nested buffer for an INDIRECT_BUFFER packet
    ///
    /// Returns `None` when there is nothing to push; the packet bracket is
    /// then already closed.
    fn enter_indirect_buffer(
        &mut self,
        depth: usize,
        address: u32,
        words: u32,
    ) -> Option<RingCursor> {
        if depth >= self.config.max_indirect_depth as usize {
            let err = GpuError::IndirectDepthExceeded(self.config.max_indirect_depth);
            tracing::error!("PM4_INDIRECT_BUFFER 0x{:08X}: {}", address, err);
            self.stats.failed += 1;
            self.trace.packet_end();
            return None;
        }

        self.stats.indirect_buffers += 1;
        self.trace.indirect_buffer_start(address, words * 4);

        if words == 0 {
            self.leave_indirect_buffer();
            return None;
        }

        match RingCursor::new(Arc::clone(&self.memory), address, words * 4) {
            Ok(inner) => Some(inner),
            Err(e) => {
                tracing::error!("PM4_INDIRECT_BUFFER 0x{:08X}: {}", address, e);
                self.stats.failed += 1;
                self.leave_indirect_buffer();
                None
            }
        }
    }

    /// Close a nested buffer and the packet that opened it
    fn leave_indirect_buffer(&mut self) {
        self.trace.indirect_buffer_end();
        self.trace.packet_end();
    }

    /// Decode and execute the packet at the cursor
    pub(crate) fn execute_packet(&mut self, cursor: &mut RingCursor) -> PacketOutcome {
        let packet = cursor.read_u32();
        self.stats.packets += 1;

        if packet == 0 || packet == PACKET_BAD_FOOD {
            self.trace.packet_start(cursor.address_behind(4), 1);
            self.trace.packet_end();
            self.stats.ignored += 1;
            return PacketOutcome::Ignored;
        }
        if packet == PACKET_UNINITIALIZED {
            tracing::warn!("GPU packet is CDCDCDCD - probably read uninitialized memory!");
        }

        let header = PacketHeader::decode(packet);
        if self.config.trace_packets {
            gpu_trace!("0x{:08X}: {:08X} {:?}", cursor.address_behind(4), packet, header);
        }

        let outcome = match header {
            PacketHeader::Type0 { base_index, count, one_register } => {
                self.execute_type0(cursor, base_index, count, one_register)
            }
            PacketHeader::Type1 { reg_index_1, reg_index_2 } => {
                self.execute_type1(cursor, reg_index_1, reg_index_2)
            }
            PacketHeader::Type2 => {
                self.trace.packet_start(cursor.address_behind(4), 1);
                self.trace.packet_end();
                PacketOutcome::Executed
            }
            PacketHeader::Type3 { opcode, count, predicated } => {
                self.execute_type3(cursor, opcode, count, predicated)
            }
        };

        match outcome {
            PacketOutcome::Skipped => self.stats.skipped += 1,
            PacketOutcome::Failed => self.stats.failed += 1,
            PacketOutcome::Overflow => self.stats.overflows += 1,
            _ => {}
        }
        outcome
    }

    /// Report a packet that does not fit the extent
    ///
    /// The header is pushed back so the extent is left as it was.
    fn overflow(&mut self, cursor: &mut RingCursor, kind: &str, needed: u32) -> PacketOutcome {
        let err = GpuError::CountOverflow { needed, available: cursor.read_count() };
        tracing::error!("{} overflow: {}", kind, err);
        self.trace.packet_start(cursor.address_behind(4), 1);
        self.trace.packet_end();
        cursor.rewind(4);
        PacketOutcome::Overflow
    }

    fn execute_type0(
        &mut self,
        cursor: &mut RingCursor,
        base_index: u32,
        count: u32,
        one_register: bool,
    ) -> PacketOutcome {
        if cursor.read_count() < count * 4 {
            return self.overflow(cursor, "ExecutePacketType0", count * 4);
        }

        self.trace.packet_start(cursor.address_behind(4), 1 + count);
        for i in 0..count {
            let value = cursor.read_u32();
            let index = if one_register { base_index } else { base_index + i };
            self.write_register(index, value);
        }
        self.trace.packet_end();
        PacketOutcome::Executed
    }

    fn execute_type1(
        &mut self,
        cursor: &mut RingCursor,
        reg_index_1: u32,
        reg_index_2: u32,
    ) -> PacketOutcome {
        if cursor.read_count() < 8 {
            return self.overflow(cursor, "ExecutePacketType1", 8);
        }

        self.trace.packet_start(cursor.address_behind(4), 3);
        let value_1 = cursor.read_u32();
        let value_2 = cursor.read_u32();
        self.write_register(reg_index_1, value_1);
        self.write_register(reg_index_2, value_2);
        self.trace.packet_end();
        PacketOutcome::Executed
    }

    /// Write a register, applying scratch write-back
    pub fn write_register(&mut self, index: u32, value: u32) {
        if !self.regs.write(index, value) {
            tracing::warn!("Dropping write of 0x{:08X} to register 0x{:04X}", value, index);
            return;
        }

        if (reg::SCRATCH_REG0..=reg::SCRATCH_REG7).contains(&index) {
            let scratch = index - reg::SCRATCH_REG0;
            if self.regs.read(reg::SCRATCH_UMSK) & (1 << scratch) != 0 {
                let address = self.regs.read(reg::SCRATCH_ADDR).wrapping_add(scratch * 4);
                self.memory.write_be32(address, value);
            }
        }
    }

    /// Write consecutive registers
    fn write_register_range(&mut self, base_index: u32, values: impl IntoIterator<Item = u32>) {
        for (i, value) in values.into_iter().enumerate() {
            self.write_register(base_index + i as u32, value);
        }
    }

    /// Read a register, flushing pending coherency first
    pub fn read_register(&mut self, index: u32) -> Result<u32, GpuError> {
        if index == reg::COHER_STATUS_HOST {
            self.make_coherent();
        }
        self.regs.get(index).ok_or(GpuError::RegisterOutOfRange(index))
    }

    /// Hand a pending coherency range to the backend and clear the request
    fn make_coherent(&mut self) {
        let status = self.regs.read(reg::COHER_STATUS_HOST);
        if status & COHER_STATUS_PENDING == 0 {
            return;
        }

        let base = self.regs.read(reg::COHER_BASE_HOST);
        let size = self.regs.read(reg::COHER_SIZE_HOST);
        gpu_trace!("Make coherent 0x{:08X} (0x{:X} bytes)", base, size);
        self.backend.make_coherent(base, size);
        self.regs.write(reg::COHER_STATUS_HOST, 0);
    }

    /// Load a word through a tagged address
    fn read_memory_word(&mut self, tagged: u32) -> u32 {
        let (address, endian) = Endian::split_address(tagged);
        let value = self.memory.load_u32(address);
        self.trace.memory_read(self.memory.gpu_address_of(address), 4);
        endian.swap(value)
    }

    /// Store a word through a tagged address
    fn write_memory_word(&mut self, tagged: u32, value: u32) {
        let (address, endian) = Endian::split_address(tagged);
        self.memory.store_u32(address, endian.swap(value));
        self.trace.memory_write(self.memory.gpu_address_of(address), 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::packet::Opcode;
    use crate::trace::{RecordingTraceWriter, TraceEvent};

    const BUFFER: u32 = 0x1000;

    fn setup() -> (CommandProcessor, RecordingTraceWriter) {
        let memory = MemoryManager::new(0x10_0000).unwrap();
        let trace = RecordingTraceWriter::new();
        let cp = CommandProcessor::new(memory, Box::new(NullBackend::new()), GpuConfig::default())
            .with_trace_writer(Box::new(trace.clone()));
        (cp, trace)
    }

    fn cursor_over(cp: &CommandProcessor, words: &[u32]) -> RingCursor {
        cp.memory().write_be32_slice(BUFFER, words).unwrap();
        RingCursor::new(Arc::clone(cp.memory()), BUFFER, words.len() as u32 * 4).unwrap()
    }

    #[test]
    fn test_sentinels_are_ignored() {
        let (mut cp, trace) = setup();
        let mut cursor = cursor_over(&cp, &[0, PACKET_BAD_FOOD]);

        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Ignored);
        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Ignored);
        assert_eq!(
            trace.events(),
            vec![
                TraceEvent::PacketStart { address: BUFFER, word_count: 1 },
                TraceEvent::PacketEnd,
                TraceEvent::PacketStart { address: BUFFER + 4, word_count: 1 },
                TraceEvent::PacketEnd,
            ]
        );
        assert_eq!(cp.stats().ignored, 2);
    }

    #[test]
    fn test_uninitialized_pattern_decodes() {
        let (mut cp, _) = setup();
        // 0xCDCDCDCD is a type-3 header with opcode 0x4D and a huge count
        let mut cursor = cursor_over(&cp, &[PACKET_UNINITIALIZED, 0]);
        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Overflow);
        assert_eq!(cursor.read_count(), 8);
    }

    #[test]
    fn test_type0_one_register() {
        let (mut cp, _) = setup();
        let mut cursor = cursor_over(&cp, &[PacketHeader::type0(0x200, 3, true), 1, 2, 3]);

        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Executed);
        assert_eq!(cp.registers().read(0x200), 3);
        assert_eq!(cp.registers().read(0x201), 0);
    }

    #[test]
    fn test_type0_overflow_leaves_extent() {
        let (mut cp, trace) = setup();
        let mut cursor = cursor_over(&cp, &[PacketHeader::type0(0x200, 4, false), 1, 2]);

        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Overflow);
        assert_eq!(cursor.read_count(), 12);
        assert_eq!(cp.registers().read(0x200), 0);
        assert_eq!(trace.packet_count(), 1);
    }

    #[test]
    fn test_type1_overflow() {
        let (mut cp, _) = setup();
        let mut cursor = cursor_over(&cp, &[PacketHeader::type1(0x10, 0x20), 5]);
        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Overflow);
        assert_eq!(cp.registers().read(0x10), 0);
    }

    #[test]
    fn test_type2_is_noop() {
        let (mut cp, trace) = setup();
        let mut cursor = cursor_over(&cp, &[0x8000_0000]);
        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Executed);
        assert_eq!(trace.packet_count(), 1);
    }

    #[test]
    fn test_scratch_write_back() {
        let (mut cp, _) = setup();
        cp.write_register(reg::SCRATCH_ADDR, 0x8000);
        cp.write_register(reg::SCRATCH_UMSK, 0b100);

        cp.write_register(reg::SCRATCH_REG0 + 2, 0xAABB_CCDD);
        cp.write_register(reg::SCRATCH_REG0 + 1, 0x1111_1111);

        assert_eq!(cp.memory().read_be32(0x8008), 0xAABB_CCDD);
        assert_eq!(cp.memory().read_be32(0x8004), 0);
    }

    #[test]
    fn test_out_of_range_register_write_dropped() {
        let (mut cp, _) = setup();
        let mut cursor = cursor_over(&cp, &[PacketHeader::type0(0x7FFF, 1, false), 9]);
        assert_eq!(cp.execute_packet(&mut cursor), PacketOutcome::Executed);
        assert_eq!(cursor.read_count(), 0);
    }

    #[test]
    fn test_coherency_flush_on_read() {
        let (mut cp, _) = setup();
        cp.write_register(reg::COHER_BASE_HOST, 0x1000);
        cp.write_register(reg::COHER_SIZE_HOST, 0x200);
        cp.write_register(reg::COHER_STATUS_HOST, COHER_STATUS_PENDING);

        assert_eq!(cp.read_register(reg::COHER_STATUS_HOST), Ok(0));
        assert_eq!(
            cp.read_register(crate::registers::REGISTER_COUNT as u32),
            Err(GpuError::RegisterOutOfRange(0x5003))
        );
    }

    #[test]
    fn test_execute_indirect_buffer_brackets() {
        let (mut cp, trace) = setup();
        cp.memory()
            .write_be32_slice(BUFFER, &[PacketHeader::type3(Opcode::Nop, 1, false), 0])
            .unwrap();

        assert_eq!(cp.execute_indirect_buffer(BUFFER, 2), Ok(DrainStatus::Completed));
        assert_eq!(
            trace.events(),
            vec![
                TraceEvent::IndirectBufferStart { address: BUFFER, size: 8 },
                TraceEvent::PacketStart { address: BUFFER, word_count: 2 },
                TraceEvent::PacketEnd,
                TraceEvent::IndirectBufferEnd,
            ]
        );
    }

    #[test]
    fn test_empty_indirect_buffer() {
        let (mut cp, trace) = setup();
        assert_eq!(cp.execute_indirect_buffer(BUFFER, 0), Ok(DrainStatus::Completed));
        assert_eq!(trace.events().len(), 2);
    }

    #[test]
    fn test_primary_ring_requires_init() {
        let (mut cp, _) = setup();
        assert_eq!(cp.execute_primary_buffer(0, 4), Err(GpuError::RingNotInitialized));
    }

    #[test]
    fn test_primary_ring_wraps() {
        let (mut cp, _) = setup();
        // 2^(2 + 3) = 32 bytes, 8 words
        cp.initialize_ring(0x4000, 2).unwrap();
        cp.memory()
            .write_be32_slice(0x4000 + 24, &[PacketHeader::type0(0x300, 3, false), 7])
            .unwrap();
        cp.memory().write_be32_slice(0x4000, &[8, 9]).unwrap();

        assert_eq!(cp.execute_primary_buffer(6, 2), Ok(2));
        assert_eq!(cp.registers().read(0x300), 7);
        assert_eq!(cp.registers().read(0x301), 8);
        assert_eq!(cp.registers().read(0x302), 9);

        // Nothing pending
        assert_eq!(cp.execute_primary_buffer(2, 2), Ok(2));
    }
}
