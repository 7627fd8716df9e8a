//! Replica placement and transfer: the chunk locker, a persistent replica/transaction store,
//! the replication jobs and the controller that dispatches them to workers.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod controller;
pub mod jobs;
pub mod locker;
pub mod replica_info;
pub mod store;

pub use controller::{Controller, ControllerError, ControllerIdentity, WorkerClient};
pub use locker::{Chunk, ChunkLocker, EmptyOwnerError};
pub use replica_info::{ReplicaInfo, ReplicaStatus, TransactionInfo, TransactionState};
pub use store::{
    PgReplicaStore, ReplicaStore, ReplicationLevelCache, StoreError,
    REPLICATION_LEVEL_CACHE_TTL_MILLIS,
};
