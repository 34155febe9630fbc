//! DRAW_INDX and DRAW_INDX_2

use xe_core::error::GpuError;
use xe_core::gpu_trace;

use super::{CommandProcessor, Step};
use crate::draw::{DmaSize, DrawInitiator, IndexBufferInfo, SourceSelect, VizQueryControl};
use crate::registers::reg;
use crate::ring::RingCursor;

impl CommandProcessor {
    pub(super) fn execute_draw_indx(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        // Leading viz query token; conditional rendering is not modelled
        let viz_query_condition = cursor.read_u32();
        gpu_trace!("PM4_DRAW_INDX viz query condition {:08X}", viz_query_condition);
        self.execute_draw(cursor, "PM4_DRAW_INDX", count - 1)
    }

    pub(super) fn execute_draw_indx_2(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        self.execute_draw(cursor, "PM4_DRAW_INDX_2", count)
    }

    /// Decode the draw registers and submit the draw
    ///
    /// Trailing words are left for the dispatcher to skip. Only a truncated
    /// packet fails; an unsupported or rejected draw is dropped.
    fn execute_draw(
        &mut self,
        cursor: &mut RingCursor,
        name: &'static str,
        mut remaining: u32,
    ) -> Result<Step, GpuError> {
        if remaining == 0 {
            return Err(GpuError::PacketTooSmall("VGT_DRAW_INITIATOR"));
        }
        let raw_initiator = cursor.read_u32();
        remaining -= 1;
        self.regs.write(reg::VGT_DRAW_INITIATOR, raw_initiator);
        let initiator = DrawInitiator::decode(raw_initiator);

        let index_buffer = match SourceSelect::from_raw(initiator.source_select) {
            Ok(SourceSelect::Dma) => {
                if remaining == 0 {
                    return Err(GpuError::PacketTooSmall("VGT_DMA_BASE"));
                }
                let dma_base = cursor.read_u32();
                remaining -= 1;
                self.regs.write(reg::VGT_DMA_BASE, dma_base);

                if remaining == 0 {
                    return Err(GpuError::PacketTooSmall("VGT_DMA_SIZE"));
                }
                let raw_size = cursor.read_u32();
                self.regs.write(reg::VGT_DMA_SIZE, raw_size);

                Some(IndexBufferInfo::new(dma_base, &initiator, DmaSize::decode(raw_size)))
            }
            Ok(SourceSelect::AutoIndex) => None,
            Ok(SourceSelect::Immediate) => {
                tracing::error!(
                    "{}: Using immediate vertex indices, which are not supported yet",
                    name
                );
                return Ok(Step::Continue);
            }
            Err(e) => {
                tracing::error!("{}: {}", name, e);
                return Ok(Step::Continue);
            }
        };

        if VizQueryControl::decode(self.regs.read(reg::PA_SC_VIZ_QUERY)).kills_draws() {
            gpu_trace!("{}: dropped by visibility query", name);
            return Ok(Step::Continue);
        }

        if let Err(e) = self.backend.issue_draw(
            initiator.prim_type,
            initiator.num_indices,
            index_buffer.as_ref(),
            initiator.is_major_mode_explicit(),
        ) {
            tracing::error!(
                "{}({}, {}, {}): Failed in backend: {}",
                name,
                initiator.num_indices,
                initiator.prim_type.raw(),
                initiator.source_select,
                GpuError::Backend(e)
            );
        }
        Ok(Step::Continue)
    }
}
