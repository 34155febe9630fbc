//! Byte-swap conventions selected by address tags
//!
//! Memory operands of PM4 packets carry the swap mode in their two low bits.
//! Every guest memory access made on behalf of a packet goes through
//! [`Endian::split_address`] and [`Endian::swap`].

/// Xenos endian swap mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// No swap
    #[default]
    None,
    /// Swap bytes within each 16-bit half
    Swap8In16,
    /// Swap all four bytes
    Swap8In32,
    /// Swap the two 16-bit halves
    Swap16In32,
}

impl Endian {
    /// Decode a 2-bit swap mode
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::None,
            1 => Self::Swap8In16,
            2 => Self::Swap8In32,
            _ => Self::Swap16In32,
        }
    }

    /// Split a tagged operand into its word-aligned address and swap mode
    #[inline]
    pub fn split_address(tagged: u32) -> (u32, Self) {
        (tagged & !0x3, Self::from_bits(tagged))
    }

    /// Apply the swap to a raw host-order word
    #[inline]
    pub fn swap(self, value: u32) -> u32 {
        match self {
            Self::None => value,
            Self::Swap8In16 => ((value << 8) & 0xFF00_FF00) | ((value >> 8) & 0x00FF_00FF),
            Self::Swap8In32 => value.swap_bytes(),
            Self::Swap16In32 => value.rotate_left(16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_modes() {
        let v = 0x1122_3344;
        assert_eq!(Endian::None.swap(v), 0x1122_3344);
        assert_eq!(Endian::Swap8In16.swap(v), 0x2211_4433);
        assert_eq!(Endian::Swap8In32.swap(v), 0x4433_2211);
        assert_eq!(Endian::Swap16In32.swap(v), 0x3344_1122);
    }

    #[test]
    fn test_swaps_are_involutions() {
        for mode in [Endian::None, Endian::Swap8In16, Endian::Swap8In32, Endian::Swap16In32] {
            assert_eq!(mode.swap(mode.swap(0xA1B2_C3D4)), 0xA1B2_C3D4);
        }
    }

    #[test]
    fn test_split_address() {
        assert_eq!(Endian::split_address(0x1000_0102), (0x1000_0100, Endian::Swap8In32));
        assert_eq!(Endian::split_address(0x1000_0103), (0x1000_0100, Endian::Swap16In32));
        assert_eq!(Endian::split_address(0x1000_0100), (0x1000_0100, Endian::None));
    }
}
