//! Small test utilities shared across the workspace: a once-per-process logging init and (with
//! the `future_timeout` feature) a bound on how long a test future may run.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

use parking_lot::Once;

static START_LOGGING: Once = Once::new();

/// Install a `tracing_subscriber` that honors `RUST_LOG`, once per process.
///
/// Call at the top of any `#[test]`/`#[tokio::test]` that wants to see its own log output; later
/// calls in the same process are no-ops, matching the pattern used throughout the teacher corpus
/// (`test_helpers::maybe_start_logging()`).
pub fn maybe_start_logging() {
    START_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(feature = "future_timeout")]
mod timeout {
    use std::{future::Future, time::Duration};

    /// Extension trait bounding how long a test future may run before panicking.
    #[async_trait::async_trait]
    pub trait FutureTimeout: Future {
        /// Await `self`, panicking if it does not resolve within `duration`.
        async fn with_timeout_panic(self, duration: Duration) -> Self::Output;
    }

    #[async_trait::async_trait]
    impl<F> FutureTimeout for F
    where
        F: Future + Send,
    {
        async fn with_timeout_panic(self, duration: Duration) -> Self::Output {
            tokio::time::timeout(duration, self)
                .await
                .expect("future did not complete within timeout")
        }
    }
}

#[cfg(feature = "future_timeout")]
pub use timeout::FutureTimeout;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_logging_is_idempotent() {
        maybe_start_logging();
        maybe_start_logging();
    }
}
