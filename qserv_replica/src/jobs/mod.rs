//! Every concrete [`qserv_job::Job`] the replication controller can schedule.

pub mod abort_transaction;
pub mod find_all;
pub mod fixup;
pub mod move_replica;
pub mod purge;
pub mod rebalance;
pub mod replicate;

pub use abort_transaction::AbortTransactionJob;
pub use find_all::{FindAllJob, FindAllJobResult};
pub use fixup::{FixUpJob, FixUpJobResult};
pub use move_replica::MoveReplicaJob;
pub use purge::{PurgeJob, PurgeJobResult};
pub use rebalance::{RebalanceJob, RebalanceJobResult};
pub use replicate::{ReplicateJob, ReplicateJobResult};
