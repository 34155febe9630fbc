//! Draw initiator and index buffer decoding

use xe_core::error::GpuError;

use crate::endian::Endian;

/// Primitive topology of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    None,
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleFan,
    TriangleStrip,
    Unknown0x07,
    RectangleList,
    LineLoop,
    QuadList,
    QuadStrip,
    Polygon,
    /// Tessellated or otherwise unnamed type
    Other(u8),
}

impl PrimitiveType {
    /// Decode the 6-bit prim_type field
    pub fn from_raw(value: u32) -> Self {
        match value & 0x3F {
            0x00 => Self::None,
            0x01 => Self::PointList,
            0x02 => Self::LineList,
            0x03 => Self::LineStrip,
            0x04 => Self::TriangleList,
            0x05 => Self::TriangleFan,
            0x06 => Self::TriangleStrip,
            0x07 => Self::Unknown0x07,
            0x08 => Self::RectangleList,
            0x0C => Self::LineLoop,
            0x0D => Self::QuadList,
            0x0E => Self::QuadStrip,
            0x0F => Self::Polygon,
            other => Self::Other(other as u8),
        }
    }

    /// Raw prim_type field value
    pub fn raw(self) -> u32 {
        match self {
            Self::None => 0x00,
            Self::PointList => 0x01,
            Self::LineList => 0x02,
            Self::LineStrip => 0x03,
            Self::TriangleList => 0x04,
            Self::TriangleFan => 0x05,
            Self::TriangleStrip => 0x06,
            Self::Unknown0x07 => 0x07,
            Self::RectangleList => 0x08,
            Self::LineLoop => 0x0C,
            Self::QuadList => 0x0D,
            Self::QuadStrip => 0x0E,
            Self::Polygon => 0x0F,
            Self::Other(value) => value as u32,
        }
    }
}

/// Where a draw takes its indices from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelect {
    /// Index buffer in guest memory
    Dma,
    /// Indices inline in the packet
    Immediate,
    /// Generated indices, no index buffer
    AutoIndex,
}

impl SourceSelect {
    pub fn from_raw(value: u32) -> Result<Self, GpuError> {
        match value {
            0 => Ok(Self::Dma),
            1 => Ok(Self::Immediate),
            2 => Ok(Self::AutoIndex),
            other => Err(GpuError::UnsupportedSourceSelect(other)),
        }
    }
}

/// Width of one index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Int16,
    Int32,
}

impl IndexFormat {
    /// Bytes per index
    pub fn size(self) -> u32 {
        match self {
            Self::Int16 => 2,
            Self::Int32 => 4,
        }
    }
}

/// Decoded VGT_DRAW_INITIATOR word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawInitiator {
    pub prim_type: PrimitiveType,
    /// Raw source_select field
    pub source_select: u32,
    pub major_mode: u32,
    pub index_size: IndexFormat,
    pub num_indices: u32,
}

impl DrawInitiator {
    pub fn decode(value: u32) -> Self {
        Self {
            prim_type: PrimitiveType::from_raw(value),
            source_select: (value >> 6) & 0x3,
            major_mode: (value >> 8) & 0x3,
            index_size: if value & (1 << 11) != 0 {
                IndexFormat::Int32
            } else {
                IndexFormat::Int16
            },
            num_indices: value >> 16,
        }
    }

    /// Whether the draw carries its own major mode
    pub fn is_major_mode_explicit(&self) -> bool {
        self.major_mode != 0 || self.prim_type.raw() >= 0x10
    }
}

/// Decoded VGT_DMA_SIZE word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaSize {
    pub num_words: u32,
    pub swap_mode: Endian,
}

impl DmaSize {
    pub fn decode(value: u32) -> Self {
        Self {
            num_words: value & 0x00FF_FFFF,
            swap_mode: Endian::from_bits(value >> 30),
        }
    }
}

/// Index buffer handed to the backend with a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferInfo {
    /// Guest address of the first index
    pub guest_base: u32,
    pub endianness: Endian,
    pub format: IndexFormat,
    /// Length in bytes
    pub length: u32,
    pub count: u32,
}

impl IndexBufferInfo {
    /// Assemble from the DMA registers, aligning the base to the index size
    pub fn new(dma_base: u32, initiator: &DrawInitiator, size: DmaSize) -> Self {
        Self {
            guest_base: dma_base & !(initiator.index_size.size() - 1),
            endianness: size.swap_mode,
            format: initiator.index_size,
            length: size.num_words * initiator.index_size.size(),
            count: initiator.num_indices,
        }
    }
}

/// PA_SC_VIZ_QUERY fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VizQueryControl {
    pub enabled: bool,
    pub kill_pix_post_early_z: bool,
}

impl VizQueryControl {
    pub fn decode(value: u32) -> Self {
        Self {
            enabled: value & 0x1 != 0,
            kill_pix_post_early_z: value & 0x80 != 0,
        }
    }

    /// Draws are dropped while this holds
    pub fn kills_draws(&self) -> bool {
        self.enabled && self.kill_pix_post_early_z
    }
}
