//! A semaphore whose total permit count can be grown or shrunk while acquires are outstanding.
//!
//! `tokio::sync::Semaphore` only grows; the priority command pool needs to shrink capacity too
//! when an operator reconfigures `controllerThreads` at runtime, so this wraps it with a resize
//! operation implemented as forgetting or adding permits.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::{Semaphore, SemaphorePermit};

/// A resizable counting semaphore.
#[derive(Debug)]
pub struct AsyncSemaphore {
    sem: Semaphore,
    total: AtomicUsize,
}

impl AsyncSemaphore {
    /// Create a new semaphore with `permits` total permits.
    pub fn new(permits: usize) -> Self {
        Self {
            sem: Semaphore::new(permits),
            total: AtomicUsize::new(permits),
        }
    }

    /// Acquire one permit, waiting if none are currently available.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.sem
            .acquire()
            .await
            .expect("AsyncSemaphore is never closed")
    }

    /// Total permits currently configured.
    pub fn total_permits(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Permits available for immediate acquisition.
    pub fn available_permits(&self) -> usize {
        self.sem.available_permits()
    }

    /// Grow or shrink total capacity to `permits`.
    ///
    /// Shrinking only affects permits not currently held: outstanding acquires are not revoked.
    pub fn resize(&self, permits: usize) {
        let current = self.total.swap(permits, Ordering::SeqCst);
        if permits > current {
            self.sem.add_permits(permits - current);
        } else if permits < current {
            self.sem.forget_permits(current - permits);
        }
    }
}

/// A semaphore shared across an `Arc`, convenient for the priority pool's per-class guards.
pub type SharedAsyncSemaphore = Arc<AsyncSemaphore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resize_grows_and_shrinks_available_permits() {
        let sem = AsyncSemaphore::new(2);
        assert_eq!(sem.available_permits(), 2);

        sem.resize(4);
        assert_eq!(sem.available_permits(), 4);
        assert_eq!(sem.total_permits(), 4);

        sem.resize(1);
        assert_eq!(sem.available_permits(), 1);
    }

    #[tokio::test]
    async fn acquire_blocks_until_release() {
        let sem = Arc::new(AsyncSemaphore::new(1));
        let _permit = sem.acquire().await;
        assert_eq!(sem.available_permits(), 0);
    }
}
