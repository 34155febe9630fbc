//! Cancellation and idle bookkeeping for blocking waits

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct ShutdownState {
    requested: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared shutdown request
///
/// Set from outside the worker; WAIT_REG_MEM checks it on every poll and
/// abandons the wait once it is raised. A raised flag also cuts short any
/// [`ShutdownFlag::sleep`] in progress.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<ShutdownState>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown, waking any sleeper
    pub fn request(&self) {
        self.0.requested.store(true, Ordering::Release);
        let _guard = self.0.lock.lock();
        self.0.wake.notify_all();
    }

    /// Withdraw a shutdown request
    pub fn reset(&self) {
        self.0.requested.store(false, Ordering::Release);
    }

    /// Whether shutdown was requested
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.0.requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless shutdown is requested first
    ///
    /// Returns whether shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut guard = self.0.lock.lock();
        if !self.is_requested() {
            self.0.wake.wait_for(&mut guard, duration);
        }
        self.is_requested()
    }
}

/// Hooks bracketing every sleep of a long wait
pub trait WaitHooks: Send + Sync {
    /// Called before the worker sleeps
    fn prepare_for_wait(&self) {}
    /// Called after the worker wakes
    fn return_from_wait(&self) {}
}

/// Hooks that do nothing
#[derive(Debug, Default)]
pub struct NoWaitHooks;

impl WaitHooks for NoWaitHooks {}

/// Hooks counting how often the worker slept
#[derive(Debug, Default)]
pub struct CountingWaitHooks {
    prepared: AtomicU64,
    returned: AtomicU64,
}

impl CountingWaitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `prepare_for_wait` calls
    pub fn prepared(&self) -> u64 {
        self.prepared.load(Ordering::Relaxed)
    }

    /// Number of `return_from_wait` calls
    pub fn returned(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }
}

impl WaitHooks for CountingWaitHooks {
    fn prepare_for_wait(&self) {
        self.prepared.fetch_add(1, Ordering::Relaxed);
    }

    fn return_from_wait(&self) {
        self.returned.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag_shared() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();

        assert!(!other.is_requested());
        flag.request();
        assert!(other.is_requested());
        other.reset();
        assert!(!flag.is_requested());
    }

    #[test]
    fn test_sleep_wakes_on_request() {
        let flag = ShutdownFlag::new();
        let requester = flag.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            requester.request();
        });

        let start = std::time::Instant::now();
        assert!(flag.sleep(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();

        // Already raised: no sleep at all
        assert!(flag.sleep(Duration::from_secs(60)));
    }

    #[test]
    fn test_sleep_times_out() {
        let flag = ShutdownFlag::new();
        assert!(!flag.sleep(Duration::from_millis(1)));
    }

    #[test]
    fn test_counting_hooks() {
        let hooks = CountingWaitHooks::new();
        hooks.prepare_for_wait();
        hooks.return_from_wait();
        hooks.prepare_for_wait();
        assert_eq!(hooks.prepared(), 2);
        assert_eq!(hooks.returned(), 1);
    }
}
