//! Backend that records every call

use std::sync::Arc;

use parking_lot::Mutex;

use super::GraphicsBackend;
use crate::draw::{IndexBufferInfo, PrimitiveType};
use crate::shader::{Shader, ShaderStage};

/// Recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Draw {
        prim_type: PrimitiveType,
        index_count: u32,
        index_buffer: Option<IndexBufferInfo>,
        major_mode_explicit: bool,
    },
    Swap {
        frontbuffer: u32,
        width: u32,
        height: u32,
    },
    Interrupt {
        cpu: u32,
        source: u32,
    },
    ShaderLoad {
        stage: ShaderStage,
        guest_address: u32,
        dword_count: usize,
    },
    MakeCoherent {
        base: u32,
        size: u32,
    },
    InvalidateState {
        mask: u32,
    },
}

/// Backend keeping a shared log of calls
///
/// Clones share the log. Draws can be made to fail to exercise the
/// rejection path.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    events: Arc<Mutex<Vec<BackendEvent>>>,
    reject_draws: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that records draws but reports them as failed
    pub fn rejecting_draws() -> Self {
        Self {
            reject_draws: true,
            ..Self::default()
        }
    }

    /// Snapshot of the recorded calls
    pub fn events(&self) -> Vec<BackendEvent> {
        self.events.lock().clone()
    }

    /// Number of draws submitted
    pub fn draw_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, BackendEvent::Draw { .. }))
            .count()
    }

    fn push(&self, event: BackendEvent) {
        self.events.lock().push(event);
    }
}

impl GraphicsBackend for RecordingBackend {
    fn issue_draw(
        &mut self,
        prim_type: PrimitiveType,
        index_count: u32,
        index_buffer: Option<&IndexBufferInfo>,
        major_mode_explicit: bool,
    ) -> Result<(), String> {
        self.push(BackendEvent::Draw {
            prim_type,
            index_count,
            index_buffer: index_buffer.copied(),
            major_mode_explicit,
        });
        if self.reject_draws {
            return Err(format!("draw of {index_count} indices rejected"));
        }
        Ok(())
    }

    fn issue_swap(&mut self, frontbuffer: u32, width: u32, height: u32) {
        self.push(BackendEvent::Swap { frontbuffer, width, height });
    }

    fn dispatch_interrupt(&mut self, cpu: u32, source: u32) {
        self.push(BackendEvent::Interrupt { cpu, source });
    }

    fn load_shader(&mut self, shader: &Arc<Shader>) {
        self.push(BackendEvent::ShaderLoad {
            stage: shader.stage,
            guest_address: shader.guest_address,
            dword_count: shader.dword_count(),
        });
    }

    fn make_coherent(&mut self, base: u32, size: u32) {
        self.push(BackendEvent::MakeCoherent { base, size });
    }

    fn invalidate_state(&mut self, mask: u32) {
        self.push(BackendEvent::InvalidateState { mask });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejecting_backend_still_records() {
        let handle = RecordingBackend::rejecting_draws();
        let mut backend: Box<dyn GraphicsBackend> = Box::new(handle.clone());

        assert!(backend
            .issue_draw(PrimitiveType::PointList, 1, None, true)
            .is_err());
        backend.dispatch_interrupt(2, 1);

        assert_eq!(handle.draw_count(), 1);
        assert_eq!(handle.events()[1], BackendEvent::Interrupt { cpu: 2, source: 1 });
    }
}
