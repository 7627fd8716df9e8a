//! A minimal, dependency-light metrics registry.
//!
//! This mirrors the shape (not the full feature set) of InfluxDB IOx's `metric` crate: a single
//! [`Registry`] hands out named, labeled instruments (currently [`U64Counter`] and [`U64Gauge`])
//! that are cheap to clone and update from any thread. There is no export format baked in here —
//! callers read `Registry::report` and ship it wherever they like (logs, an HTTP endpoint, …).

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};

/// A set of `key=value` labels attached to a metric observation.
pub type Attributes = BTreeMap<&'static str, String>;

/// A monotonically increasing counter.
#[derive(Debug, Clone, Default)]
pub struct U64Counter(Arc<AtomicU64>);

impl U64Counter {
    /// Increment the counter by `delta`.
    pub fn inc(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value.
    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can go up and down, e.g. "jobs currently running".
#[derive(Debug, Clone, Default)]
pub struct U64Gauge(Arc<AtomicI64>);

impl U64Gauge {
    /// Set the gauge to an absolute value.
    pub fn set(&self, value: u64) {
        self.0.store(value as i64, Ordering::Relaxed);
    }

    /// Add (or, with a negative `delta`, subtract) from the gauge.
    pub fn inc(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value.
    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed).max(0) as u64
    }
}

#[derive(Debug, Default)]
struct Instruments {
    counters: BTreeMap<(&'static str, Attributes), U64Counter>,
    gauges: BTreeMap<(&'static str, Attributes), U64Gauge>,
}

/// A process-wide registry of named metric instruments.
///
/// Cloning a `Registry` is cheap: instances share the same underlying table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Instruments>>,
}

impl Registry {
    /// Return the counter named `name` with `attributes`, creating it at zero if absent.
    pub fn register_counter(&self, name: &'static str, attributes: Attributes) -> U64Counter {
        self.inner
            .lock()
            .counters
            .entry((name, attributes))
            .or_default()
            .clone()
    }

    /// Return the gauge named `name` with `attributes`, creating it at zero if absent.
    pub fn register_gauge(&self, name: &'static str, attributes: Attributes) -> U64Gauge {
        self.inner
            .lock()
            .gauges
            .entry((name, attributes))
            .or_default()
            .clone()
    }

    /// Snapshot every counter and gauge as `(name, attributes, value)` triples, for logging or
    /// scraping.
    pub fn report(&self) -> Vec<(&'static str, Attributes, u64)> {
        let inner = self.inner.lock();
        let mut out = Vec::with_capacity(inner.counters.len() + inner.gauges.len());
        for ((name, attrs), c) in &inner.counters {
            out.push((*name, attrs.clone(), c.fetch()));
        }
        for ((name, attrs), g) in &inner.gauges {
            out.push((*name, attrs.clone(), g.fetch()));
        }
        out
    }
}
