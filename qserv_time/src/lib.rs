//! Time as a trait, so that every deadline/timestamp computation in this workspace (replica
//! `verifyTime`, transaction `beginTime`/`endTime`, request `receive_time`/`start_time`/
//! `finish_time`, job and request deadlines) can be driven from a controllable clock in tests
//! instead of the wall clock.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use parking_lot::Mutex;
use std::{fmt::Debug, sync::Arc, time::Duration};

/// Milliseconds since the Unix epoch, the wire format used for every timestamp in this
/// workspace's request/response and replica metadata types.
pub type TimestampMillis = i64;

/// An object that can report the current time.
///
/// `Send + Sync + Debug` so it can be stored behind an `Arc<dyn TimeProvider>` in long-lived
/// services (the `Executive`, the replication `Controller`, …).
pub trait TimeProvider: Debug + Send + Sync {
    /// The current time, in milliseconds since the Unix epoch.
    fn now_millis(&self) -> TimestampMillis;

    /// Sleep for `duration`, yielding to the async runtime.
    fn sleep<'a>(
        &'a self,
        duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A [`TimeProvider`] backed by the OS wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    /// Construct a new system-clock provider.
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now_millis(&self) -> TimestampMillis {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as TimestampMillis
    }
}

/// A [`TimeProvider`] whose clock is advanced explicitly by tests.
#[derive(Debug)]
pub struct MockProvider {
    now: Mutex<TimestampMillis>,
}

impl MockProvider {
    /// Construct a mock clock starting at `now`.
    pub fn new(now: TimestampMillis) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance_millis(&self, delta_ms: i64) {
        *self.now.lock() += delta_ms;
    }

    /// Set the clock to an absolute value.
    pub fn set_millis(&self, now: TimestampMillis) {
        *self.now.lock() = now;
    }
}

impl TimeProvider for MockProvider {
    fn now_millis(&self) -> TimestampMillis {
        *self.now.lock()
    }

    fn sleep<'a>(
        &'a self,
        _duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        // Mocked clocks never actually wait: tests advance time explicitly.
        Box::pin(std::future::ready(()))
    }
}

/// Convenience alias used throughout the workspace for a shared, dynamically-dispatched clock.
pub type TimeProviderRef = Arc<dyn TimeProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_advances_on_demand() {
        let p = MockProvider::new(1_000);
        assert_eq!(p.now_millis(), 1_000);
        p.advance_millis(500);
        assert_eq!(p.now_millis(), 1_500);
        p.set_millis(42);
        assert_eq!(p.now_millis(), 42);
    }

    #[test]
    fn system_provider_is_monotonic_enough() {
        let p = SystemProvider::new();
        let a = p.now_millis();
        let b = p.now_millis();
        assert!(b >= a);
    }
}
