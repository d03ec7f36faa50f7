use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::Fault;

/// Process-wide switch that turns on blocking mutual exclusion for tracker state.
///
/// Trackers are reachable from the very first allocation of the process, long before the
/// program has spawned threads. Until the gate is armed the tracker only *tries* the lock:
/// during single-threaded start-up that never fails, and a failure means the start-up
/// assumption was broken, which is reported as [`Fault::UnarmedContention`]. Once armed,
/// every operation blocks on the lock for its whole duration.
#[derive(Debug)]
pub struct ConcurrencyGate {
    armed: AtomicBool,
}

impl ConcurrencyGate {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    /// Arms the gate. Arming is one-way; repeated calls have no effect.
    #[inline]
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Acquires `lock` according to the gate's state.
    ///
    /// Poisoning is ignored: a panic while holding tracker state only happens on paths that
    /// are about to halt anyway.
    pub fn enter<'a, T>(&self, lock: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, Fault> {
        if self.is_armed() {
            return Ok(lock.lock().unwrap_or_else(PoisonError::into_inner));
        }

        match lock.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Fault::UnarmedContention),
        }
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}
