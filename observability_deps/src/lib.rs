//! This crate exists to pin the observability-related dependencies (currently just `tracing`)
//! that the rest of the workspace uses, so that every crate logs through the same facade and
//! a version bump happens in exactly one place.
//!
//! Always depend on this crate rather than `tracing` directly: `use observability_deps::tracing::info;`

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub use tracing;
