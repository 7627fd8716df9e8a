//! Logging pipeline setup shared by every `qservd` binary mode (czar, worker, replication
//! controller). Builds a `tracing_subscriber` stack from a [`cli::LoggingConfig`] so the three
//! binaries configure logging identically.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod cli;

use std::io;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, util::TryInitError,
    EnvFilter, Layer, Registry,
};

/// Errors that can occur while building or installing the logging subscriber.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A global subscriber has already been installed (e.g. in a test harness).
    #[error("setting global default subscriber failed: {0}")]
    SetGlobalDefault(#[from] TryInitError),
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One `key=value` line per event (default, matches worker/czar production logs).
    Logfmt,
    /// One JSON object per event.
    Json,
    /// Human-oriented, `tracing_subscriber`'s built in full formatter.
    Full,
}

/// Build and install the global `tracing` subscriber described by `config`.
///
/// Returns a guard-like `Builder` value; callers keep it alive for the process lifetime (most
/// binaries just drop the return value, since this crate does not use non-blocking writers that
/// need a flush guard).
pub fn init(config: &cli::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = Registry::default().with(filter);

    match config.log_format {
        LogFormat::Logfmt => registry
            .with(logfmt_layer())
            .try_init()
            .map_err(Error::from),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .map_err(Error::from),
        LogFormat::Full => registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(Error::from),
    }
}

fn logfmt_layer<S>() -> impl Layer<S>
where
    S: observability_deps::tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    logfmt::LogFmtLayer::new(io::stderr())
}
