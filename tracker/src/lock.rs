//! A `parking_lot`-backed mutex that records how many callers are currently waiting, so the
//! priority pool and the chunk locker can surface contention instead of hanging silently.

use metric::U64Gauge;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A mutex instrumented with a waiter count.
#[derive(Debug)]
pub struct TrackedLock<T> {
    inner: Mutex<T>,
    waiters: AtomicUsize,
    gauge: Option<U64Gauge>,
}

impl<T> TrackedLock<T> {
    /// Wrap `value` in an uninstrumented tracked lock.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            waiters: AtomicUsize::new(0),
            gauge: None,
        }
    }

    /// Wrap `value`, publishing the live waiter count to `gauge`.
    pub fn with_gauge(value: T, gauge: U64Gauge) -> Self {
        Self {
            inner: Mutex::new(value),
            waiters: AtomicUsize::new(0),
            gauge: Some(gauge),
        }
    }

    /// Acquire the lock, incrementing/decrementing the waiter count around the block.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let waiting = self.waiters.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(g) = &self.gauge {
            g.set(waiting as u64);
        }
        let guard = self.inner.lock();
        let waiting = self.waiters.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(g) = &self.gauge {
            g.set(waiting as u64);
        }
        guard
    }

    /// Current number of callers blocked trying to acquire this lock.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_grants_exclusive_access() {
        let lock = TrackedLock::new(0_u64);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
        assert_eq!(lock.waiters(), 0);
    }
}
