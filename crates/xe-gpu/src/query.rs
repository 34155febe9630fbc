//! Occlusion query sample count block

use bytemuck::{Pod, Zeroable};

/// Marker D3D stores big-endian into a pair of counters when a query ends
pub const QUERY_FINISHED: u32 = 0xFFFF_FEED;

/// Sample counters at RB_SAMPLE_COUNT_ADDR
///
/// Fields hold raw guest words in host order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[allow(non_snake_case)]
pub struct DepthSampleCounts {
    pub Total_A: u32,
    pub Total_B: u32,
    pub ZFail_A: u32,
    pub ZFail_B: u32,
    pub ZPass_A: u32,
    pub ZPass_B: u32,
    pub StencilFail_A: u32,
    pub StencilFail_B: u32,
}

impl DepthSampleCounts {
    fn is_marker(field: u32) -> bool {
        u32::from_be(field) == QUERY_FINISHED
    }

    /// Query ended through the z-pass counters
    pub fn ended_via_z_pass(&self) -> bool {
        Self::is_marker(self.ZPass_A) && Self::is_marker(self.ZPass_B)
    }

    /// Query ended through the z-fail counters (older D3D)
    pub fn ended_via_z_fail(&self) -> bool {
        Self::is_marker(self.ZFail_A) && Self::is_marker(self.ZFail_B)
    }

    /// Block reported for a finished query
    pub fn finished_with(sample_count: u32) -> Self {
        Self {
            Total_A: sample_count.to_le(),
            ZPass_A: sample_count.to_le(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_detection() {
        let marker = QUERY_FINISHED.to_be();
        let counts = DepthSampleCounts {
            ZPass_A: marker,
            ZPass_B: marker,
            ZFail_A: marker,
            ..Default::default()
        };
        assert!(counts.ended_via_z_pass());
        assert!(!counts.ended_via_z_fail());
        assert_eq!(std::mem::size_of::<DepthSampleCounts>(), 32);
    }
}
