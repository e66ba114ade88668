use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide "a batch is running" flag
///
/// Acquisition never waits: a second caller is rejected, not queued.
#[derive(Debug, Clone, Default)]
pub struct BatchLock {
    running: Arc<AtomicBool>,
}

impl BatchLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<BatchPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BatchPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of one batch; released on drop, including on panic unwind
#[derive(Debug)]
pub struct BatchPermit {
    running: Arc<AtomicBool>,
}

impl Drop for BatchPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
