//! PM4 packet headers and opcodes

use bitflags::bitflags;

/// Terminal marker written by the driver over consumed command space
pub const PACKET_BAD_FOOD: u32 = 0x0BAD_F00D;
/// Fill pattern of uninitialized debug heap memory
pub const PACKET_UNINITIALIZED: u32 = 0xCDCD_CDCD;

/// `'SWAP'` signature leading an XE_SWAP payload
pub const SWAP_SIGNATURE: u32 = 0x5357_4150;

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    /// Write `count` registers starting at `base_index`
    Type0 {
        base_index: u32,
        count: u32,
        /// Write every value to `base_index` instead of incrementing
        one_register: bool,
    },
    /// Write two explicitly indexed registers
    Type1 { reg_index_1: u32, reg_index_2: u32 },
    /// No-op filler
    Type2,
    /// Opcode packet with `count` payload words
    Type3 {
        opcode: u32,
        count: u32,
        predicated: bool,
    },
}

impl PacketHeader {
    /// Decode a header word
    pub fn decode(packet: u32) -> Self {
        match packet >> 30 {
            0 => Self::Type0 {
                base_index: packet & 0x7FFF,
                count: ((packet >> 16) & 0x3FFF) + 1,
                one_register: (packet >> 15) & 0x1 != 0,
            },
            1 => Self::Type1 {
                reg_index_1: packet & 0x7FF,
                reg_index_2: (packet >> 11) & 0x7FF,
            },
            2 => Self::Type2,
            _ => Self::Type3 {
                opcode: (packet >> 8) & 0x7F,
                count: ((packet >> 16) & 0x3FFF) + 1,
                predicated: packet & 0x1 != 0,
            },
        }
    }

    /// Build a type-0 header
    pub const fn type0(base_index: u32, count: u32, one_register: bool) -> u32 {
        ((count - 1) & 0x3FFF) << 16 | (one_register as u32) << 15 | (base_index & 0x7FFF)
    }

    /// Build a type-1 header
    pub const fn type1(reg_index_1: u32, reg_index_2: u32) -> u32 {
        0x4000_0000 | (reg_index_2 & 0x7FF) << 11 | (reg_index_1 & 0x7FF)
    }

    /// Build a type-3 header
    pub const fn type3(opcode: Opcode, count: u32, predicated: bool) -> u32 {
        0xC000_0000 | ((count - 1) & 0x3FFF) << 16 | (opcode as u32) << 8 | predicated as u32
    }
}

/// Type-3 opcodes understood by the command processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Nop = 0x10,
    RegRmw = 0x21,
    DrawIndx = 0x22,
    VizQuery = 0x23,
    WaitForIdle = 0x26,
    ImLoad = 0x27,
    ImLoadImmediate = 0x2B,
    SetConstant = 0x2D,
    LoadAluConstant = 0x2F,
    DrawIndx2 = 0x36,
    IndirectBufferPfd = 0x37,
    InvalidateState = 0x3B,
    WaitRegMem = 0x3C,
    MemWrite = 0x3D,
    RegToMem = 0x3E,
    IndirectBuffer = 0x3F,
    CondWrite = 0x45,
    EventWrite = 0x46,
    MeInit = 0x48,
    SetBinMask = 0x50,
    SetBinSelect = 0x51,
    Interrupt = 0x54,
    SetConstant2 = 0x55,
    SetShaderConstants = 0x56,
    EventWriteShd = 0x58,
    EventWriteExt = 0x5A,
    EventWriteZpd = 0x5B,
    ContextUpdate = 0x5E,
    SetBinMaskLo = 0x60,
    SetBinMaskHi = 0x61,
    SetBinSelectLo = 0x62,
    SetBinSelectHi = 0x63,
    XeSwap = 0x64,
}

impl Opcode {
    /// Map a 7-bit opcode field to a known opcode
    pub fn from_raw(value: u32) -> Option<Self> {
        let opcode = match value {
            0x10 => Self::Nop,
            0x21 => Self::RegRmw,
            0x22 => Self::DrawIndx,
            0x23 => Self::VizQuery,
            0x26 => Self::WaitForIdle,
            0x27 => Self::ImLoad,
            0x2B => Self::ImLoadImmediate,
            0x2D => Self::SetConstant,
            0x2F => Self::LoadAluConstant,
            0x36 => Self::DrawIndx2,
            0x37 => Self::IndirectBufferPfd,
            0x3B => Self::InvalidateState,
            0x3C => Self::WaitRegMem,
            0x3D => Self::MemWrite,
            0x3E => Self::RegToMem,
            0x3F => Self::IndirectBuffer,
            0x45 => Self::CondWrite,
            0x46 => Self::EventWrite,
            0x48 => Self::MeInit,
            0x50 => Self::SetBinMask,
            0x51 => Self::SetBinSelect,
            0x54 => Self::Interrupt,
            0x55 => Self::SetConstant2,
            0x56 => Self::SetShaderConstants,
            0x58 => Self::EventWriteShd,
            0x5A => Self::EventWriteExt,
            0x5B => Self::EventWriteZpd,
            0x5E => Self::ContextUpdate,
            0x60 => Self::SetBinMaskLo,
            0x61 => Self::SetBinMaskHi,
            0x62 => Self::SetBinSelectLo,
            0x63 => Self::SetBinSelectHi,
            0x64 => Self::XeSwap,
            _ => return None,
        };
        Some(opcode)
    }

    /// Mnemonic used in log messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "PM4_NOP",
            Self::RegRmw => "PM4_REG_RMW",
            Self::DrawIndx => "PM4_DRAW_INDX",
            Self::VizQuery => "PM4_VIZ_QUERY",
            Self::WaitForIdle => "PM4_WAIT_FOR_IDLE",
            Self::ImLoad => "PM4_IM_LOAD",
            Self::ImLoadImmediate => "PM4_IM_LOAD_IMMEDIATE",
            Self::SetConstant => "PM4_SET_CONSTANT",
            Self::LoadAluConstant => "PM4_LOAD_ALU_CONSTANT",
            Self::DrawIndx2 => "PM4_DRAW_INDX_2",
            Self::IndirectBufferPfd => "PM4_INDIRECT_BUFFER_PFD",
            Self::InvalidateState => "PM4_INVALIDATE_STATE",
            Self::WaitRegMem => "PM4_WAIT_REG_MEM",
            Self::MemWrite => "PM4_MEM_WRITE",
            Self::RegToMem => "PM4_REG_TO_MEM",
            Self::IndirectBuffer => "PM4_INDIRECT_BUFFER",
            Self::CondWrite => "PM4_COND_WRITE",
            Self::EventWrite => "PM4_EVENT_WRITE",
            Self::MeInit => "PM4_ME_INIT",
            Self::SetBinMask => "PM4_SET_BIN_MASK",
            Self::SetBinSelect => "PM4_SET_BIN_SELECT",
            Self::Interrupt => "PM4_INTERRUPT",
            Self::SetConstant2 => "PM4_SET_CONSTANT2",
            Self::SetShaderConstants => "PM4_SET_SHADER_CONSTANTS",
            Self::EventWriteShd => "PM4_EVENT_WRITE_SHD",
            Self::EventWriteExt => "PM4_EVENT_WRITE_EXT",
            Self::EventWriteZpd => "PM4_EVENT_WRITE_ZPD",
            Self::ContextUpdate => "PM4_CONTEXT_UPDATE",
            Self::SetBinMaskLo => "PM4_SET_BIN_MASK_LO",
            Self::SetBinMaskHi => "PM4_SET_BIN_MASK_HI",
            Self::SetBinSelectLo => "PM4_SET_BIN_SELECT_LO",
            Self::SetBinSelectHi => "PM4_SET_BIN_SELECT_HI",
            Self::XeSwap => "PM4_XE_SWAP",
        }
    }
}

/// Comparison applied by WAIT_REG_MEM and COND_WRITE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
    Always,
}

impl CompareFunction {
    /// Decode the low 3 bits of a wait info word
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x7 {
            0 => Self::Never,
            1 => Self::Less,
            2 => Self::LessEqual,
            3 => Self::Equal,
            4 => Self::NotEqual,
            5 => Self::GreaterEqual,
            6 => Self::Greater,
            _ => Self::Always,
        }
    }

    /// Compare a masked value against the reference
    #[inline]
    pub fn matches(self, value: u32, reference: u32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => value < reference,
            Self::LessEqual => value <= reference,
            Self::Equal => value == reference,
            Self::NotEqual => value != reference,
            Self::GreaterEqual => value >= reference,
            Self::Greater => value > reference,
            Self::Always => true,
        }
    }
}

bitflags! {
    /// Operand selection bits of WAIT_REG_MEM / COND_WRITE info words
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitInfo: u32 {
        /// Poll a memory location instead of a register
        const POLL_MEMORY = 0x10;
        /// COND_WRITE targets memory instead of a register
        const WRITE_MEMORY = 0x100;
    }
}

impl WaitInfo {
    /// Comparison encoded in the low bits
    pub fn function(self) -> CompareFunction {
        CompareFunction::from_bits(self.bits())
    }
}

bitflags! {
    /// Operand selection bits of REG_RMW info words
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RmwInfo: u32 {
        /// AND operand names a register
        const AND_REGISTER = 1 << 31;
        /// OR operand names a register
        const OR_REGISTER = 1 << 30;
    }
}

bitflags! {
    /// CPUs targeted by an INTERRUPT packet
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuMask: u32 {
        const CPU0 = 1 << 0;
        const CPU1 = 1 << 1;
        const CPU2 = 1 << 2;
        const CPU3 = 1 << 3;
        const CPU4 = 1 << 4;
        const CPU5 = 1 << 5;
    }
}

impl CpuMask {
    /// Indices of the targeted CPUs
    pub fn cpus(self) -> impl Iterator<Item = u32> {
        (0..6).filter(move |n| self.bits() & (1 << n) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_type0() {
        assert_eq!(
            PacketHeader::decode(0x0002_0100),
            PacketHeader::Type0 { base_index: 0x100, count: 3, one_register: false }
        );
        assert_eq!(PacketHeader::type0(0x100, 3, false), 0x0002_0100);
        assert_eq!(
            PacketHeader::decode(PacketHeader::type0(0x2000, 1, true)),
            PacketHeader::Type0 { base_index: 0x2000, count: 1, one_register: true }
        );
    }

    #[test]
    fn test_decode_type1() {
        let header = PacketHeader::type1(0x10, 0x20);
        assert_eq!(
            PacketHeader::decode(header),
            PacketHeader::Type1 { reg_index_1: 0x10, reg_index_2: 0x20 }
        );
    }

    #[test]
    fn test_decode_type3() {
        let header = PacketHeader::type3(Opcode::WaitRegMem, 5, true);
        assert_eq!(
            PacketHeader::decode(header),
            PacketHeader::Type3 { opcode: 0x3C, count: 5, predicated: true }
        );
        assert_eq!(PacketHeader::decode(0x8000_0000), PacketHeader::Type2);
    }

    #[test]
    fn test_opcode_table_round_trips() {
        for raw in 0..0x80 {
            if let Some(opcode) = Opcode::from_raw(raw) {
                assert_eq!(opcode as u32, raw, "{}", opcode.name());
            }
        }
        assert_eq!(Opcode::from_raw(0x7A), None);
    }

    #[test]
    fn test_compare_table() {
        let cases = [
            (5, 5, 3, true),
            (5, 5, 0, false),
            (1, 5, 7, true),
            (1, 5, 1, true),
            (5, 5, 1, false),
            (5, 5, 2, true),
            (6, 5, 2, false),
            (4, 5, 4, true),
            (5, 5, 4, false),
            (5, 5, 5, true),
            (4, 5, 5, false),
            (6, 5, 6, true),
            (5, 5, 6, false),
            (0, 0, 0, false),
        ];
        for (value, reference, code, expected) in cases {
            assert_eq!(
                CompareFunction::from_bits(code).matches(value, reference),
                expected,
                "match({value}, {reference}, {code})"
            );
        }
    }

    #[test]
    fn test_wait_info_bits() {
        let info = WaitInfo::from_bits_retain(0x113);
        assert!(info.contains(WaitInfo::POLL_MEMORY));
        assert!(info.contains(WaitInfo::WRITE_MEMORY));
        assert_eq!(info.function(), CompareFunction::Equal);
    }

    #[test]
    fn test_cpu_mask() {
        let cpus: Vec<u32> = CpuMask::from_bits_retain(0b100101 | 0x40).cpus().collect();
        assert_eq!(cpus, vec![0, 2, 5]);
    }
}
