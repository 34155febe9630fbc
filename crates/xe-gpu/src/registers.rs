//! Xenos register file

/// Number of addressable GPU registers
pub const REGISTER_COUNT: usize = 0x5003;

/// Register indices with behavior inside the command processor
pub mod reg {
    pub const SCRATCH_UMSK: u32 = 0x01DC;
    pub const SCRATCH_ADDR: u32 = 0x01DD;
    pub const SCRATCH_REG0: u32 = 0x0578;
    pub const SCRATCH_REG7: u32 = 0x057F;

    pub const COHER_SIZE_HOST: u32 = 0x0A2F;
    pub const COHER_BASE_HOST: u32 = 0x0A30;
    pub const COHER_STATUS_HOST: u32 = 0x0A31;

    pub const PA_SC_VIZ_QUERY_STATUS_0: u32 = 0x0C44;
    pub const PA_SC_VIZ_QUERY_STATUS_1: u32 = 0x0C45;

    pub const VGT_EVENT_INITIATOR: u32 = 0x21F9;
    pub const VGT_DMA_BASE: u32 = 0x21FA;
    pub const VGT_DMA_SIZE: u32 = 0x21FB;
    pub const VGT_DRAW_INITIATOR: u32 = 0x21FC;

    pub const PA_SC_VIZ_QUERY: u32 = 0x2293;

    pub const RB_SAMPLE_COUNT_ADDR: u32 = 0x2325;

    /// First register written by the REGISTERS constant class
    pub const CONTEXT_BASE: u32 = 0x2000;
    /// First ALU (float4) shader constant
    pub const SHADER_CONSTANT_BASE: u32 = 0x4000;
    /// First texture/vertex fetch constant
    pub const FETCH_CONSTANT_BASE: u32 = 0x4800;
    /// First boolean constant
    pub const BOOL_CONSTANT_BASE: u32 = 0x4900;
    /// First loop constant
    pub const LOOP_CONSTANT_BASE: u32 = 0x4908;
}

/// Pending bit of COHER_STATUS_HOST
pub const COHER_STATUS_PENDING: u32 = 0x8000_0000;

/// Event initiator values written by VIZ_QUERY
pub const VIZQUERY_START: u32 = 0x07;
pub const VIZQUERY_END: u32 = 0x08;

/// Flat GPU register storage
///
/// Raw storage only: side effects of special registers are applied by the
/// command processor, the sole writer.
pub struct RegisterFile {
    values: Box<[u32]>,
}

impl RegisterFile {
    /// Create a zeroed register file
    pub fn new() -> Self {
        Self {
            values: vec![0; REGISTER_COUNT].into_boxed_slice(),
        }
    }

    /// Read a register, `None` when out of range
    #[inline]
    pub fn get(&self, index: u32) -> Option<u32> {
        self.values.get(index as usize).copied()
    }

    /// Read a register, out-of-range indices read as zero
    #[inline]
    pub fn read(&self, index: u32) -> u32 {
        self.get(index).unwrap_or(0)
    }

    /// Write a register, returns false when out of range
    #[inline]
    pub fn write(&mut self, index: u32, value: u32) -> bool {
        match self.values.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bounds() {
        let mut regs = RegisterFile::new();

        assert!(regs.write(0x100, 0xDEAD));
        assert_eq!(regs.read(0x100), 0xDEAD);

        let last = REGISTER_COUNT as u32 - 1;
        assert!(regs.write(last, 1));
        assert!(!regs.write(last + 1, 1));
        assert_eq!(regs.get(last + 1), None);
        assert_eq!(regs.read(last + 1), 0);
    }

    #[test]
    fn test_constant_ranges_fit() {
        let mut regs = RegisterFile::new();
        assert!(regs.write(reg::LOOP_CONSTANT_BASE + 31, 1));
        assert!(regs.write(reg::SHADER_CONSTANT_BASE + 511 * 4, 1));
    }
}
