//! HTTP admin surface: `/ingest/v1/*` (transactions, databases, tables, chunk placement)
//! implemented end-to-end against the replica store, plus a narrow trait boundary for the
//! generic `/replication/v1/*` configuration surface.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod admin_api;
pub mod catalog;
pub mod error;
pub mod ingest;
pub mod router;
pub mod server;

pub use admin_api::AdminApi;
pub use catalog::DatabaseCatalog;
pub use error::AdminHttpError;
pub use ingest::IngestState;
pub use server::serve;
