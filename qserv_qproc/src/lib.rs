//! Turns one parsed user query into the set of per-chunk worker queries that must run to answer
//! it: [`session::QuerySession`] drives the [`qserv_plugins`] pipeline over a
//! [`qserv_query::SelectStmt`], [`chunk_spec`] enumerates and fragments the chunks involved, and
//! [`mapping`] renders the final per-chunk SQL.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod chunk_spec;
pub mod mapping;
pub mod session;

pub use chunk_spec::{ChunkSpec, ChunkSpecFragmenter, DUMMY_CHUNK, MAX_SUB_CHUNKS_PER_FRAGMENT};
pub use mapping::{ChunkQuerySpec, DbTable, QueryMapping};
pub use session::{SessionError, QuerySession, DEFAULT_INTERACTIVE_CHUNK_LIMIT};
