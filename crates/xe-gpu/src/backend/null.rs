//! Null backend for testing

use super::GraphicsBackend;
use crate::draw::{IndexBufferInfo, PrimitiveType};

/// Null graphics backend (accepts everything, does nothing)
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for NullBackend {
    fn issue_draw(
        &mut self,
        _prim_type: PrimitiveType,
        _index_count: u32,
        _index_buffer: Option<&IndexBufferInfo>,
        _major_mode_explicit: bool,
    ) -> Result<(), String> {
        Ok(())
    }

    fn issue_swap(&mut self, _frontbuffer: u32, _width: u32, _height: u32) {}

    fn dispatch_interrupt(&mut self, _cpu: u32, _source: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend() {
        let mut backend = NullBackend::new();
        assert!(backend
            .issue_draw(PrimitiveType::TriangleList, 3, None, false)
            .is_ok());
        backend.issue_swap(0x1000_0000, 1280, 720);
        backend.dispatch_interrupt(0, 1);
        backend.make_coherent(0, 0x1000);
        backend.invalidate_state(0xFFFF_FFFF);
    }
}
