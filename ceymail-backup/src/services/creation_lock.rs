//! Process-wide, non-blocking mutual exclusion for backup creation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CreationLock {
    held: Arc<AtomicBool>,
}

/// Releases the lock when dropped, on every exit path.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct CreationGuard {
    held: Arc<AtomicBool>,
}

impl CreationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never waits: `None` means another creation is running.
    pub fn try_acquire(&self) -> Option<CreationGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CreationGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
