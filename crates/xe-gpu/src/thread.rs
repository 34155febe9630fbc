//! GPU worker thread draining the primary ring

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use xe_core::error::{GpuError, Result};

use crate::processor::CommandProcessor;
use crate::wait::ShutdownFlag;

/// Worker thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuThreadState {
    Stopped,
    Running,
    Idle,
}

/// State shared between the producer and the worker
struct Shared {
    /// Next word the producer will write, published with release ordering
    write_index: AtomicU32,
    /// Next word the worker will read, published with release ordering
    read_index: AtomicU32,
    /// Ring size in words; both indices wrap at this value
    ring_words: u32,
    state: Mutex<GpuThreadState>,
    wake: Condvar,
}

/// How long an idle worker sleeps before re-checking the write index
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Command processor running on its own thread
///
/// The producer writes commands into the primary ring, then publishes the
/// new write index with [`GpuThread::set_write_index`]. Indices wrap at the
/// ring size, so a full ring reads as empty; the producer keeps at least one
/// word free.
pub struct GpuThread {
    shared: Arc<Shared>,
    shutdown: ShutdownFlag,
    handle: Option<JoinHandle<CommandProcessor>>,
}

impl GpuThread {
    /// Start draining the ring of `processor` from `read_index`
    ///
    /// The processor's primary ring must already be initialized. A shutdown
    /// request left over from a previous worker is cleared.
    pub fn spawn(processor: CommandProcessor, read_index: u32) -> Result<Self> {
        let ring_words = processor.ring_words().ok_or(GpuError::RingNotInitialized)?;
        let read_index = read_index % ring_words;
        let shared = Arc::new(Shared {
            write_index: AtomicU32::new(read_index),
            read_index: AtomicU32::new(read_index),
            ring_words,
            state: Mutex::new(GpuThreadState::Idle),
            wake: Condvar::new(),
        });
        let shutdown = processor.shutdown_flag();
        shutdown.reset();

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("xenos-gpu".to_string())
            .spawn(move || run(processor, worker_shared))?;

        tracing::info!("GPU worker started at read index {}", read_index);
        Ok(Self {
            shared,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Publish a new ring write index
    pub fn set_write_index(&self, index: u32) {
        let index = index % self.shared.ring_words;
        self.shared.write_index.store(index, Ordering::Release);
        let _state = self.shared.state.lock();
        self.shared.wake.notify_one();
    }

    /// Last read index published by the worker
    pub fn read_index(&self) -> u32 {
        self.shared.read_index.load(Ordering::Acquire)
    }

    pub fn state(&self) -> GpuThreadState {
        *self.shared.state.lock()
    }

    /// Whether the worker has consumed everything published so far
    pub fn is_idle(&self) -> bool {
        self.read_index() == self.shared.write_index.load(Ordering::Acquire)
    }

    /// Stop the worker and hand back its command processor
    pub fn shutdown(mut self) -> Option<CommandProcessor> {
        self.stop()
    }

    fn stop(&mut self) -> Option<CommandProcessor> {
        let handle = self.handle.take()?;
        self.shutdown.request();
        {
            let _state = self.shared.state.lock();
            self.shared.wake.notify_one();
        }
        match handle.join() {
            Ok(processor) => Some(processor),
            Err(_) => {
                tracing::error!("GPU worker panicked");
                None
            }
        }
    }
}

impl Drop for GpuThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut processor: CommandProcessor, shared: Arc<Shared>) -> CommandProcessor {
    let shutdown = processor.shutdown_flag();
    // Write index at which the last drain stopped short
    let mut stalled_at: Option<u32> = None;

    while !shutdown.is_requested() {
        let write_index = shared.write_index.load(Ordering::Acquire);
        let read_index = shared.read_index.load(Ordering::Relaxed);

        if write_index == read_index || stalled_at == Some(write_index) {
            let mut state = shared.state.lock();
            *state = GpuThreadState::Idle;
            shared.wake.wait_for(&mut state, IDLE_POLL);
            continue;
        }

        *shared.state.lock() = GpuThreadState::Running;
        match processor.execute_primary_buffer(read_index, write_index) {
            Ok(new_read_index) => {
                stalled_at = (new_read_index != write_index).then_some(write_index);
                shared.read_index.store(new_read_index, Ordering::Release);
            }
            Err(e) => {
                tracing::error!("GPU worker stopping: {}", e);
                break;
            }
        }
    }

    *shared.state.lock() = GpuThreadState::Stopped;
    tracing::info!("GPU worker stopped");
    processor
}
