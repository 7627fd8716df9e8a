//! The generic `CREATED -> IN_PROGRESS -> FINISHED` job lifecycle shared by every replication
//! job in `qserv_replica`: `FindAll`, `Replicate`, `Purge`, `Rebalance`, `FixUp`, `MoveReplica`
//! and `AbortTransaction` all implement [`Job`] and get tracking, cancellation and status
//! reporting for free.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod job;
pub mod status;

pub use job::{Job, JobContext};
pub use status::{ExtendedStatus, JobStatus, PrimaryStatus};
