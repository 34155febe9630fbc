//! Type-3 packet dispatch and the simpler opcode handlers

use xe_core::error::GpuError;
use xe_core::{gpu_debug, gpu_trace};
use xe_memory::AddressTranslator;

use super::{CommandProcessor, PacketOutcome, Step};
use crate::endian::Endian;
use crate::packet::{CpuMask, Opcode, RmwInfo, SWAP_SIGNATURE};
use crate::query::DepthSampleCounts;
use crate::registers::{reg, VIZQUERY_END, VIZQUERY_START};
use crate::ring::RingCursor;
use crate::shader::ShaderStage;

/// Interrupt source raised by INTERRUPT packets
const INTERRUPT_SOURCE_COMMAND_STREAM: u32 = 1;

/// Largest 2D/cube texture dimension, used for the faked screen extent
const TEXTURE_2D_CUBE_MAX_WIDTH_HEIGHT: u16 = 8192;

/// Constant class selected by SET_CONSTANT / LOAD_ALU_CONSTANT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstantClass {
    Alu,
    Fetch,
    Bool,
    Loop,
    Registers,
}

impl ConstantClass {
    fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Alu),
            1 => Some(Self::Fetch),
            2 => Some(Self::Bool),
            3 => Some(Self::Loop),
            4 => Some(Self::Registers),
            _ => None,
        }
    }

    /// First register of the class
    fn base(self) -> u32 {
        match self {
            Self::Alu => reg::SHADER_CONSTANT_BASE,
            Self::Fetch => reg::FETCH_CONSTANT_BASE,
            Self::Bool => reg::BOOL_CONSTANT_BASE,
            Self::Loop => reg::LOOP_CONSTANT_BASE,
            Self::Registers => reg::CONTEXT_BASE,
        }
    }
}

/// Fail unless the payload holds at least `needed` words
#[inline]
pub(super) fn require(count: u32, needed: u32, what: &'static str) -> Result<(), GpuError> {
    if count < needed {
        return Err(GpuError::PacketTooSmall(what));
    }
    Ok(())
}

impl CommandProcessor {
    pub(super) fn execute_type3(
        &mut self,
        cursor: &mut RingCursor,
        opcode: u32,
        count: u32,
        predicated: bool,
    ) -> PacketOutcome {
        if cursor.read_count() < count * 4 {
            return self.overflow(cursor, "ExecutePacketType3", count * 4);
        }

        let known = Opcode::from_raw(opcode);
        let is_indirect = matches!(known, Some(Opcode::IndirectBuffer | Opcode::IndirectBufferPfd));
        let packet_address = cursor.address_behind(4);
        self.trace
            .packet_start(packet_address, if is_indirect { 2 } else { 1 + count });

        if predicated {
            let any_pass = self.bin_select & self.bin_mask != 0;
            if !any_pass || known == Some(Opcode::XeSwap) {
                cursor.advance(count * 4);
                self.trace.packet_end();
                return PacketOutcome::Skipped;
            }
        }

        let Some(opcode) = known else {
            tracing::warn!("{}", GpuError::UnknownOpcode { opcode, count });
            cursor.advance(count * 4);
            self.trace.packet_end();
            return PacketOutcome::Failed;
        };

        let remaining_after = cursor.read_count() - count * 4;
        let result = self.dispatch_type3(cursor, opcode, count);

        // Realign to the declared packet end
        if cursor.read_count() > remaining_after {
            cursor.advance(cursor.read_count() - remaining_after);
        }

        match result {
            Ok(Step::Continue) => {
                self.trace.packet_end();
                PacketOutcome::Executed
            }
            Ok(Step::Indirect { address, words }) => PacketOutcome::Indirect { address, words },
            Ok(Step::Cancelled) => {
                self.trace.packet_end();
                PacketOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!("{}: {}", opcode.name(), e);
                self.trace.packet_end();
                PacketOutcome::Failed
            }
        }
    }

    fn dispatch_type3(
        &mut self,
        cursor: &mut RingCursor,
        opcode: Opcode,
        count: u32,
    ) -> Result<Step, GpuError> {
        match opcode {
            Opcode::MeInit => self.execute_me_init(cursor, count),
            Opcode::Nop => Ok(Step::Continue),
            Opcode::Interrupt => self.execute_interrupt(cursor, count),
            Opcode::XeSwap => self.execute_xe_swap(cursor, count),
            Opcode::IndirectBuffer | Opcode::IndirectBufferPfd => {
                self.execute_indirect_buffer_packet(cursor, count)
            }
            Opcode::WaitRegMem => self.execute_wait_reg_mem(cursor, count),
            Opcode::RegRmw => self.execute_reg_rmw(cursor, count),
            Opcode::RegToMem => self.execute_reg_to_mem(cursor, count),
            Opcode::MemWrite => self.execute_mem_write(cursor, count),
            Opcode::CondWrite => self.execute_cond_write(cursor, count),
            Opcode::EventWrite => self.execute_event_write(cursor, count),
            Opcode::EventWriteShd => self.execute_event_write_shd(cursor, count),
            Opcode::EventWriteExt => self.execute_event_write_ext(cursor, count),
            Opcode::EventWriteZpd => self.execute_event_write_zpd(cursor, count),
            Opcode::DrawIndx => self.execute_draw_indx(cursor, count),
            Opcode::DrawIndx2 => self.execute_draw_indx_2(cursor, count),
            Opcode::SetConstant => self.execute_set_constant(cursor, count),
            Opcode::SetConstant2 | Opcode::SetShaderConstants => {
                self.execute_set_register_range(cursor, count)
            }
            Opcode::LoadAluConstant => self.execute_load_alu_constant(cursor, count),
            Opcode::ImLoad => self.execute_im_load(cursor, count),
            Opcode::ImLoadImmediate => self.execute_im_load_immediate(cursor, count),
            Opcode::InvalidateState => {
                let mask = cursor.read_u32();
                self.backend.invalidate_state(mask);
                Ok(Step::Continue)
            }
            Opcode::VizQuery => self.execute_viz_query(cursor),

            Opcode::SetBinMaskLo => {
                let value = cursor.read_u32() as u64;
                self.bin_mask = (self.bin_mask & 0xFFFF_FFFF_0000_0000) | value;
                Ok(Step::Continue)
            }
            Opcode::SetBinMaskHi => {
                let value = cursor.read_u32() as u64;
                self.bin_mask = (self.bin_mask & 0xFFFF_FFFF) | (value << 32);
                Ok(Step::Continue)
            }
            Opcode::SetBinSelectLo => {
                let value = cursor.read_u32() as u64;
                self.bin_select = (self.bin_select & 0xFFFF_FFFF_0000_0000) | value;
                Ok(Step::Continue)
            }
            Opcode::SetBinSelectHi => {
                let value = cursor.read_u32() as u64;
                self.bin_select = (self.bin_select & 0xFFFF_FFFF) | (value << 32);
                Ok(Step::Continue)
            }
            Opcode::SetBinMask => {
                self.bin_mask = read_u64_hi_lo(cursor, count, "PM4_SET_BIN_MASK")?;
                Ok(Step::Continue)
            }
            Opcode::SetBinSelect => {
                self.bin_select = read_u64_hi_lo(cursor, count, "PM4_SET_BIN_SELECT")?;
                Ok(Step::Continue)
            }

            Opcode::ContextUpdate => {
                let value = cursor.read_u32();
                gpu_debug!("GPU context update = {:08X}", value);
                if value != 0 {
                    tracing::warn!("PM4_CONTEXT_UPDATE with unexpected value {:08X}", value);
                }
                Ok(Step::Continue)
            }
            Opcode::WaitForIdle => {
                let value = cursor.read_u32();
                gpu_debug!("GPU wait for idle = {:08X}", value);
                Ok(Step::Continue)
            }
        }
    }

    fn execute_me_init(&mut self, cursor: &mut RingCursor, count: u32) -> Result<Step, GpuError> {
        self.me_bin.clear();
        self.me_bin.extend((0..count).map(|_| cursor.read_u32()));
        Ok(Step::Continue)
    }

    fn execute_interrupt(
        &mut self,
        cursor: &mut RingCursor,
        _count: u32,
    ) -> Result<Step, GpuError> {
        let cpu_mask = CpuMask::from_bits_retain(cursor.read_u32());
        for cpu in cpu_mask.cpus() {
            self.backend.dispatch_interrupt(cpu, INTERRUPT_SOURCE_COMMAND_STREAM);
        }
        Ok(Step::Continue)
    }

    fn execute_xe_swap(&mut self, cursor: &mut RingCursor, count: u32) -> Result<Step, GpuError> {
        require(count, 4, "PM4_XE_SWAP")?;

        let magic = cursor.read_u32();
        if magic != SWAP_SIGNATURE {
            tracing::warn!("PM4_XE_SWAP without SWAP signature ({:08X})", magic);
        }
        let frontbuffer = cursor.read_u32();
        let width = cursor.read_u32();
        let height = cursor.read_u32();

        gpu_trace!("Swap 0x{:08X} {}x{}", frontbuffer, width, height);
        self.backend.issue_swap(frontbuffer, width, height);
        self.frame_counter = self.frame_counter.wrapping_add(1);
        Ok(Step::Continue)
    }

    fn execute_indirect_buffer_packet(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 2, "PM4_INDIRECT_BUFFER")?;

        let list_ptr = self.memory.gpu_address_of(cursor.read_u32());
        let list_length = cursor.read_u32();
        if list_length & !0xF_FFFF != 0 {
            gpu_debug!("Indirect buffer length {:08X} has high bits set", list_length);
        }

        Ok(Step::Indirect {
            address: self.memory.cpu_address_of(list_ptr),
            words: list_length & 0xF_FFFF,
        })
    }

    fn execute_reg_rmw(&mut self, cursor: &mut RingCursor, count: u32) -> Result<Step, GpuError> {
        require(count, 3, "PM4_REG_RMW")?;

        let rmw_info = cursor.read_u32();
        let and_mask = cursor.read_u32();
        let or_mask = cursor.read_u32();
        let info = RmwInfo::from_bits_retain(rmw_info);
        let index = rmw_info & 0x1FFF;

        let mut value = self.regs.read(index);
        value &= if info.contains(RmwInfo::AND_REGISTER) {
            self.regs.read(and_mask & 0x1FFF)
        } else {
            and_mask
        };
        value |= if info.contains(RmwInfo::OR_REGISTER) {
            self.regs.read(or_mask & 0x1FFF)
        } else {
            or_mask
        };

        self.write_register(index, value);
        Ok(Step::Continue)
    }

    fn execute_reg_to_mem(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 2, "PM4_REG_TO_MEM")?;

        let reg_index = cursor.read_u32();
        let mem_addr = cursor.read_u32();
        let value = self.read_register(reg_index)?;
        self.write_memory_word(mem_addr, value);
        Ok(Step::Continue)
    }

    fn execute_mem_write(&mut self, cursor: &mut RingCursor, count: u32) -> Result<Step, GpuError> {
        let mut write_addr = cursor.read_u32();
        for _ in 1..count {
            let data = cursor.read_u32();
            self.write_memory_word(write_addr, data);
            write_addr = write_addr.wrapping_add(4);
        }
        Ok(Step::Continue)
    }

    fn execute_event_write(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        let initiator = cursor.read_u32();
        self.regs.write(reg::VGT_EVENT_INITIATOR, initiator & 0x3F);
        if count > 1 {
            // Remaining words are skipped by realignment
            return Err(GpuError::MalformedEventWrite(count));
        }
        Ok(Step::Continue)
    }

    fn execute_event_write_shd(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 3, "PM4_EVENT_WRITE_SHD")?;

        let initiator = cursor.read_u32();
        let address = cursor.read_u32();
        let value = cursor.read_u32();
        self.regs.write(reg::VGT_EVENT_INITIATOR, initiator & 0x3F);

        let data = if initiator & 0x8000_0000 != 0 {
            self.frame_counter
        } else {
            value
        };
        self.write_memory_word(address, data);
        Ok(Step::Continue)
    }

    fn execute_event_write_ext(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 2, "PM4_EVENT_WRITE_EXT")?;

        let initiator = cursor.read_u32();
        let tagged = cursor.read_u32();
        self.regs.write(reg::VGT_EVENT_INITIATOR, initiator & 0x3F);

        let (address, _) = Endian::split_address(tagged);
        // min x, max x, min y, max y, min z, max z
        let extents: [u16; 6] = [
            0,
            TEXTURE_2D_CUBE_MAX_WIDTH_HEIGHT >> 3,
            0,
            TEXTURE_2D_CUBE_MAX_WIDTH_HEIGHT >> 3,
            0,
            1,
        ];
        for (i, extent) in extents.iter().enumerate() {
            self.memory.write_be16(address.wrapping_add(i as u32 * 2), *extent);
        }
        self.trace.memory_write(
            self.memory.gpu_address_of(address),
            std::mem::size_of_val(&extents) as u32,
        );
        Ok(Step::Continue)
    }

    fn execute_event_write_zpd(
        &mut self,
        cursor: &mut RingCursor,
        _count: u32,
    ) -> Result<Step, GpuError> {
        let initiator = cursor.read_u32();
        self.regs.write(reg::VGT_EVENT_INITIATOR, initiator & 0x3F);

        let fake_sample_count = self.config.occlusion_fake_sample_count;
        if fake_sample_count < 0 {
            return Ok(Step::Continue);
        }

        let address = self.regs.read(reg::RB_SAMPLE_COUNT_ADDR);
        let counts: DepthSampleCounts = self.memory.read(address)?;
        let finished = counts.ended_via_z_pass() || counts.ended_via_z_fail();
        let result = if finished {
            DepthSampleCounts::finished_with(fake_sample_count as u32)
        } else {
            DepthSampleCounts::default()
        };
        self.memory.write(address, result)?;
        Ok(Step::Continue)
    }

    fn execute_set_constant(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        let offset_type = cursor.read_u32();
        let index = offset_type & 0x7FF;
        let class = (offset_type >> 16) & 0xFF;

        match ConstantClass::from_raw(class) {
            Some(class) => {
                let values: Vec<u32> = (1..count).map(|_| cursor.read_u32()).collect();
                self.write_register_range(class.base() + index, values);
            }
            None => {
                gpu_debug!("PM4_SET_CONSTANT with unknown class {}", class);
            }
        }
        Ok(Step::Continue)
    }

    /// SET_CONSTANT2 and SET_SHADER_CONSTANTS: plain register range
    fn execute_set_register_range(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        let index = cursor.read_u32() & 0xFFFF;
        let values: Vec<u32> = (1..count).map(|_| cursor.read_u32()).collect();
        self.write_register_range(index, values);
        Ok(Step::Continue)
    }

    fn execute_load_alu_constant(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 3, "PM4_LOAD_ALU_CONSTANT")?;

        let address = cursor.read_u32() & 0x3FFF_FFFF;
        let offset_type = cursor.read_u32();
        let size_dwords = cursor.read_u32() & 0xFFF;
        let index = offset_type & 0x7FF;
        let class = (offset_type >> 16) & 0xFF;

        let Some(class) = ConstantClass::from_raw(class) else {
            gpu_debug!("PM4_LOAD_ALU_CONSTANT with unknown class {}", class);
            return Ok(Step::Continue);
        };

        self.trace
            .memory_read(self.memory.gpu_address_of(address), size_dwords * 4);
        let values = self.memory.read_be32_slice(address, size_dwords as usize)?;
        self.write_register_range(class.base() + index, values);
        Ok(Step::Continue)
    }

    fn execute_im_load(&mut self, cursor: &mut RingCursor, count: u32) -> Result<Step, GpuError> {
        require(count, 2, "PM4_IM_LOAD")?;

        let addr_type = cursor.read_u32();
        let start_size = cursor.read_u32();
        let stage = ShaderStage::from_raw(addr_type & 0x3)?;
        let address = addr_type & !0x3;
        let start = start_size >> 16;
        let size_dwords = start_size & 0xFFFF;
        if start != 0 {
            gpu_debug!("PM4_IM_LOAD with nonzero start {}", start);
        }

        self.trace
            .memory_read(self.memory.gpu_address_of(address), size_dwords * 4);
        let ucode = self.memory.read_be32_slice(address, size_dwords as usize)?;
        self.set_active_shader(stage, address, ucode);
        Ok(Step::Continue)
    }

    fn execute_im_load_immediate(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 2, "PM4_IM_LOAD_IMMEDIATE")?;

        let shader_type = cursor.read_u32();
        let start_size = cursor.read_u32();
        let size_dwords = start_size & 0xFFFF;
        if size_dwords > count - 2 {
            return Err(GpuError::ShaderTooLarge {
                size: size_dwords,
                available: count - 2,
            });
        }
        let stage = ShaderStage::from_raw(shader_type)?;

        let address = cursor.read_address();
        let ucode: Vec<u32> = (0..size_dwords).map(|_| cursor.read_u32()).collect();
        self.set_active_shader(stage, address, ucode);
        Ok(Step::Continue)
    }

    fn set_active_shader(&mut self, stage: ShaderStage, address: u32, ucode: Vec<u32>) {
        let shader = self.shaders.load(stage, address, ucode);
        gpu_trace!(
            "Loaded {:?} shader 0x{:08X} ({} dwords, hash {:016X})",
            stage,
            address,
            shader.dword_count(),
            shader.hash
        );
        self.backend.load_shader(&shader);
        match stage {
            ShaderStage::Vertex => self.active_vertex_shader = Some(shader),
            ShaderStage::Pixel => self.active_pixel_shader = Some(shader),
        }
    }

    fn execute_viz_query(&mut self, cursor: &mut RingCursor) -> Result<Step, GpuError> {
        let dword0 = cursor.read_u32();
        let id = dword0 & 0x3F;
        let end = dword0 & 0x100 != 0;

        if !end {
            self.regs.write(reg::VGT_EVENT_INITIATOR, VIZQUERY_START);
        } else {
            self.regs.write(reg::VGT_EVENT_INITIATOR, VIZQUERY_END);
            // Report every query as visible
            let (status_reg, bit) = if id < 32 {
                (reg::PA_SC_VIZ_QUERY_STATUS_0, id)
            } else {
                (reg::PA_SC_VIZ_QUERY_STATUS_1, id - 32)
            };
            let status = self.regs.read(status_reg) | (1 << bit);
            self.regs.write(status_reg, status);
        }
        Ok(Step::Continue)
    }
}

/// Read a 64-bit value sent high word first
fn read_u64_hi_lo(
    cursor: &mut RingCursor,
    count: u32,
    what: &'static str,
) -> Result<u64, GpuError> {
    require(count, 2, what)?;
    let hi = cursor.read_u32() as u64;
    let lo = cursor.read_u32() as u64;
    Ok((hi << 32) | lo)
}
