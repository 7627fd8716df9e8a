use crate::replica_info::TransactionState;
use crate::store::ReplicaStore;
use async_trait::async_trait;
use observability_deps::tracing::info;
use qserv_job::{Job, JobContext};
use qserv_time::TimeProviderRef;
use std::sync::Arc;
use uuid::Uuid;

/// Marks an in-progress super-transaction as aborted, releasing any ingest state scoped to it.
pub struct AbortTransactionJob {
    context: JobContext,
    transaction_id: Uuid,
    store: Arc<dyn ReplicaStore>,
    time_provider: TimeProviderRef,
}

impl AbortTransactionJob {
    pub fn new(
        context: JobContext,
        transaction_id: Uuid,
        store: Arc<dyn ReplicaStore>,
        time_provider: TimeProviderRef,
    ) -> Self {
        Self {
            context,
            transaction_id,
            store,
            time_provider,
        }
    }
}

#[async_trait]
impl Job for AbortTransactionJob {
    fn context(&self) -> &JobContext {
        &self.context
    }

    async fn run(&self) -> Result<(), String> {
        use qserv_time::TimeProvider;
        let now = self.time_provider.now_millis();
        self.store
            .end_transaction(self.transaction_id, TransactionState::Aborted, now)
            .await
            .map_err(|e| e.to_string())?;
        info!(transaction_id = %self.transaction_id, "aborted transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::InMemoryReplicaStore;
    use qserv_time::SystemProvider;

    #[tokio::test]
    async fn aborting_marks_the_transaction_closed() {
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());
        let txn = store.begin_transaction("lsst", 1000).await.unwrap();

        let job = AbortTransactionJob::new(
            JobContext::new("abort-1", &time_provider),
            txn.id,
            store.clone(),
            time_provider,
        );
        job.execute().await;

        let reloaded = store.get_transaction(txn.id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, TransactionState::Aborted);
        assert!(!reloaded.is_open());
    }

    #[tokio::test]
    async fn aborting_an_unknown_transaction_fails() {
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());
        let job = AbortTransactionJob::new(
            JobContext::new("abort-2", &time_provider),
            Uuid::new_v4(),
            store,
            time_provider,
        );
        let status = job.execute().await;
        assert_eq!(status.extended, qserv_job::ExtendedStatus::Failed);
    }
}
