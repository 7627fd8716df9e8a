use qserv_time::TimestampMillis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a replica is known to actually exist on its worker, or is merely recorded intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaStatus {
    NotFound,
    Complete,
    Incomplete,
}

/// One (database, chunk, worker) placement, as last observed or recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub status: ReplicaStatus,
    pub worker: String,
    pub database: String,
    pub chunk: u32,
    pub verify_time: TimestampMillis,
    pub co_located: bool,
}

impl ReplicaInfo {
    pub fn new(
        status: ReplicaStatus,
        worker: impl Into<String>,
        database: impl Into<String>,
        chunk: u32,
        verify_time: TimestampMillis,
    ) -> Self {
        Self {
            status,
            worker: worker.into(),
            database: database.into(),
            chunk,
            verify_time,
            co_located: false,
        }
    }

    pub fn with_co_located(mut self, co_located: bool) -> Self {
        self.co_located = co_located;
        self
    }
}

/// Coarse lifecycle of a super-transaction: ingest work is only accepted while `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Started,
    Committed,
    Aborted,
}

/// A super-transaction scoping a batch of ingested data for one database, so a failed or
/// abandoned ingest can be rolled back without touching previously committed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub id: Uuid,
    pub database: String,
    pub state: TransactionState,
    pub begin_time: TimestampMillis,
    pub end_time: Option<TimestampMillis>,
}

impl TransactionInfo {
    pub fn new(id: Uuid, database: impl Into<String>, begin_time: TimestampMillis) -> Self {
        Self {
            id,
            database: database.into(),
            state: TransactionState::Started,
            begin_time,
            end_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transaction_starts_open_with_no_end_time() {
        let txn = TransactionInfo::new(Uuid::nil(), "lsst", 1000);
        assert!(txn.is_open());
        assert!(txn.end_time.is_none());
    }
}
