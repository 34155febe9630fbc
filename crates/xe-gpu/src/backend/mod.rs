//! Graphics backends fed by the command processor

pub mod null;
pub mod recording;

use std::sync::Arc;

use crate::draw::{IndexBufferInfo, PrimitiveType};
use crate::shader::Shader;

/// Host side consumer of decoded GPU work
///
/// Calls are synchronous from the worker's point of view. Only `issue_draw`
/// can fail; the command processor logs a rejected draw and moves on.
pub trait GraphicsBackend: Send {
    /// Submit a draw
    fn issue_draw(
        &mut self,
        prim_type: PrimitiveType,
        index_count: u32,
        index_buffer: Option<&IndexBufferInfo>,
        major_mode_explicit: bool,
    ) -> Result<(), String>;

    /// Present a frontbuffer
    fn issue_swap(&mut self, frontbuffer: u32, width: u32, height: u32);

    /// Raise an interrupt on a guest CPU
    fn dispatch_interrupt(&mut self, cpu: u32, source: u32);

    /// A shader became active for its stage
    fn load_shader(&mut self, _shader: &Arc<Shader>) {}

    /// Guest memory in `[base, base + size)` must be made visible to the GPU
    fn make_coherent(&mut self, _base: u32, _size: u32) {}

    /// Cached derived state selected by `mask` is stale
    fn invalidate_state(&mut self, _mask: u32) {}
}

pub use null::NullBackend;
pub use recording::{BackendEvent, RecordingBackend};
