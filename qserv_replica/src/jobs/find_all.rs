use crate::controller::Controller;
use crate::replica_info::{ReplicaInfo, ReplicaStatus};
use crate::store::ReplicaStore;
use async_trait::async_trait;
use observability_deps::tracing::warn;
use parking_lot::Mutex;
use qserv_job::{Job, JobContext};
use qserv_proto::ResponsePayload;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-worker outcome of a [`FindAllJob`]: whether its find-all-replicas request succeeded.
#[derive(Debug, Default)]
pub struct FindAllJobResult {
    pub replicas: Vec<ReplicaInfo>,
    pub workers: std::collections::BTreeMap<String, bool>,
}

/// Queries every worker in `workers` for the chunks it holds for `database` and records what it
/// learns in the [`ReplicaStore`]. The precursor every other replication job chains off of, so
/// they always act on a fresh view of chunk disposition.
pub struct FindAllJob {
    context: JobContext,
    database: String,
    workers: Vec<String>,
    controller: Arc<Controller>,
    store: Arc<dyn ReplicaStore>,
    result: Mutex<FindAllJobResult>,
    num_finished: AtomicUsize,
}

impl FindAllJob {
    pub fn new(
        context: JobContext,
        database: impl Into<String>,
        workers: Vec<String>,
        controller: Arc<Controller>,
        store: Arc<dyn ReplicaStore>,
    ) -> Self {
        Self {
            context,
            database: database.into(),
            workers,
            controller,
            store,
            result: Mutex::new(FindAllJobResult::default()),
            num_finished: AtomicUsize::new(0),
        }
    }

    /// Available only once the job has finished; mirrors the original job's
    /// finished-only-access contract for the result struct.
    pub fn result(&self) -> FindAllJobResult {
        let r = self.result.lock();
        FindAllJobResult {
            replicas: r.replicas.clone(),
            workers: r.workers.clone(),
        }
    }
}

#[async_trait]
impl Job for FindAllJob {
    fn context(&self) -> &JobContext {
        &self.context
    }

    async fn run(&self) -> Result<(), String> {
        for worker in &self.workers {
            if self.context.is_cancelled() {
                break;
            }
            let outcome = self.controller.replica_find_all(worker, &self.database).await;
            self.num_finished.fetch_add(1, Ordering::SeqCst);

            match outcome {
                Ok(response) if response.payload.is_some() => {
                    if let Some(ResponsePayload::ReplicaInfo { chunk, co_located, .. }) = response.payload {
                        let replica = ReplicaInfo::new(ReplicaStatus::Complete, worker, &self.database, chunk, self.controller.now_millis())
                            .with_co_located(co_located);
                        self.store
                            .record_replica(&replica)
                            .await
                            .map_err(|e| e.to_string())?;
                        self.result.lock().replicas.push(replica);
                    }
                    self.result.lock().workers.insert(worker.clone(), true);
                }
                Ok(_) => {
                    self.result.lock().workers.insert(worker.clone(), false);
                }
                Err(e) => {
                    warn!(worker, error = %e, "find-all request failed");
                    self.result.lock().workers.insert(worker.clone(), false);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{test_support::MockWorkerClient, Controller, ControllerIdentity};
    use crate::store::test_support::InMemoryReplicaStore;
    use qserv_time::SystemProvider;

    #[tokio::test]
    async fn find_all_records_a_replica_per_responsive_worker() {
        let client = Arc::new(MockWorkerClient::default());
        let controller = Arc::new(Controller::new(
            ControllerIdentity::new("czar-1", 1),
            client,
            Arc::new(SystemProvider::new()),
        ));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let time_provider: qserv_time::TimeProviderRef = Arc::new(SystemProvider::new());
        let job = FindAllJob::new(
            JobContext::new("find-all-1", &time_provider),
            "lsst",
            vec!["worker-a".to_string(), "worker-b".to_string()],
            controller,
            store.clone(),
        );
        job.execute().await;
        let result = job.result();
        assert_eq!(result.replicas.len(), 2);
        assert_eq!(store.find_all_replicas("lsst").await.unwrap().len(), 2);
    }
}
