//! Dispatch side of query execution: once [`qserv_qproc`] has turned a user query into a list
//! of per-chunk [`qserv_qproc::ChunkQuerySpec`]s, this crate gets them to workers and the
//! results back. [`pool`] schedules dispatch work across priority classes, [`job_query`] tracks
//! each chunk request's lifecycle and retry count, [`request`] frames and sends the requests
//! themselves, [`executive`] owns one query's full set of jobs, and [`merger`] assembles the
//! final result once every chunk has answered.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod executive;
pub mod job_query;
pub mod merger;
pub mod pool;
pub mod request;

pub use executive::Executive;
pub use job_query::{JobDescription, JobQuery, DEFAULT_MAX_RETRIES};
pub use merger::{InfileMerger, MergeOutcome};
pub use pool::{Command, PriorityCommandPool, DEFAULT_PRIORITY};
pub use request::{Messenger, MessengerError, TcpMessenger};
