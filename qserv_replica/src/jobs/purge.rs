use crate::controller::Controller;
use crate::jobs::find_all::FindAllJob;
use crate::locker::{Chunk, ChunkLocker};
use crate::store::{ReplicaStore, ReplicationLevelCache};
use async_trait::async_trait;
use observability_deps::tracing::{debug, info, warn};
use parking_lot::Mutex;
use qserv_job::{Job, JobContext};
use qserv_proto::ResponseStatus;
use qserv_time::{TimeProvider, TimeProviderRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct PurgeJobResult {
    /// `chunk -> worker` for every replica this job deleted.
    pub deleted: Vec<(u32, String)>,
    pub workers: BTreeMap<String, bool>,
}

/// Brings every chunk in `database` down to `num_replicas` copies by deleting the excess,
/// the mirror image of [`super::replicate::ReplicateJob`]: it too scores current holders by
/// overall load, but prefers to delete from the most loaded workers first so deletions also
/// smooth out disposition rather than just shrinking the count.
///
/// Also chains a precursor [`FindAllJob`] to learn current disposition before picking which
/// copies to drop.
pub struct PurgeJob {
    context: JobContext,
    database: String,
    num_replicas: u32,
    workers: Vec<String>,
    controller: Arc<Controller>,
    store: Arc<dyn ReplicaStore>,
    locker: Arc<ChunkLocker>,
    level_cache: Arc<ReplicationLevelCache>,
    time_provider: TimeProviderRef,
    num_launched: AtomicUsize,
    num_success: AtomicUsize,
    result: Mutex<PurgeJobResult>,
}

impl PurgeJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: JobContext,
        database: impl Into<String>,
        num_replicas: u32,
        workers: Vec<String>,
        controller: Arc<Controller>,
        store: Arc<dyn ReplicaStore>,
        locker: Arc<ChunkLocker>,
        level_cache: Arc<ReplicationLevelCache>,
        time_provider: TimeProviderRef,
    ) -> Self {
        Self {
            context,
            database: database.into(),
            num_replicas,
            workers,
            controller,
            store,
            locker,
            level_cache,
            time_provider,
            num_launched: AtomicUsize::new(0),
            num_success: AtomicUsize::new(0),
            result: Mutex::new(PurgeJobResult::default()),
        }
    }

    /// Available only once the job has finished.
    pub fn result(&self) -> PurgeJobResult {
        self.result.lock().clone()
    }

    pub fn num_launched(&self) -> usize {
        self.num_launched.load(Ordering::SeqCst)
    }

    pub fn num_success(&self) -> usize {
        self.num_success.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for PurgeJob {
    fn context(&self) -> &JobContext {
        &self.context
    }

    async fn run(&self) -> Result<(), String> {
        let now = self.time_provider.now_millis();
        if let Some(level) = self.level_cache.get(&self.database, now) {
            if level >= 1.0 {
                debug!(database = %self.database, level, "replication level cache hit, nothing to do");
                return Ok(());
            }
        }

        let precursor = FindAllJob::new(
            JobContext::new(format!("{}-find-all", self.context.id), &self.time_provider),
            &self.database,
            self.workers.clone(),
            self.controller.clone(),
            self.store.clone(),
        );
        precursor.execute().await;
        let precursor_result = precursor.result();

        let mut holders: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for replica in &precursor_result.replicas {
            holders.entry(replica.chunk).or_default().push(replica.worker.clone());
        }

        for (&chunk, current_holders) in holders.iter() {
            if self.context.is_cancelled() {
                break;
            }
            if current_holders.len() as u32 <= self.num_replicas {
                continue;
            }
            let chunk_key = Chunk::new(&self.database, chunk);
            if !self
                .locker
                .lock(chunk_key.clone(), &self.context.id)
                .map_err(|e| e.to_string())?
            {
                continue;
            }

            let excess = current_holders.len() as u32 - self.num_replicas;
            let mut load_by_worker: HashMap<&String, usize> = HashMap::new();
            for worker in current_holders {
                let count = self
                    .store
                    .find_replicas_by_worker(worker)
                    .await
                    .map_err(|e| e.to_string())?
                    .len();
                load_by_worker.insert(worker, count);
            }
            let mut victims: Vec<&String> = current_holders.iter().collect();
            victims.sort_by_key(|w| (std::cmp::Reverse(*load_by_worker.get(*w).unwrap_or(&0)), w.as_str()));
            victims.truncate(excess as usize);

            for worker in victims {
                self.num_launched.fetch_add(1, Ordering::SeqCst);
                match self.controller.replica_delete(worker, &self.database, chunk).await {
                    Ok(response) if response.status == ResponseStatus::Success => {
                        self.num_success.fetch_add(1, Ordering::SeqCst);
                        info!(chunk, worker, "deleted replica");
                        self.store
                            .delete_replica(&self.database, chunk, worker)
                            .await
                            .map_err(|e| e.to_string())?;
                        let mut result = self.result.lock();
                        result.deleted.push((chunk, worker.clone()));
                        result.workers.insert(worker.clone(), true);
                    }
                    Ok(_) => {
                        self.result.lock().workers.insert(worker.clone(), false);
                    }
                    Err(e) => {
                        warn!(chunk, worker, error = %e, "replica delete failed");
                        self.result.lock().workers.insert(worker.clone(), false);
                    }
                }
            }
            self.locker.release(&chunk_key);
        }

        if !holders.is_empty() {
            let satisfied = holders.values().filter(|w| w.len() as u32 == self.num_replicas).count();
            let level = satisfied as f64 / holders.len() as f64;
            self.level_cache.set(&self.database, level, self.time_provider.now_millis());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{test_support::MockWorkerClient, ControllerIdentity};
    use crate::store::test_support::InMemoryReplicaStore;
    use qserv_time::SystemProvider;

    #[tokio::test]
    async fn purge_deletes_the_excess_over_the_target() {
        // MockWorkerClient reports every queried worker as holding the chunk, so 3 queried
        // workers against a target of 2 leaves exactly one excess copy to delete.
        let client = Arc::new(MockWorkerClient::default());
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());
        let controller = Arc::new(Controller::new(ControllerIdentity::new("czar-1", 1), client, time_provider.clone()));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let locker = Arc::new(ChunkLocker::new());

        let job = PurgeJob::new(
            JobContext::new("purge-1", &time_provider),
            "lsst",
            2,
            vec!["worker-a".to_string(), "worker-b".to_string(), "worker-c".to_string()],
            controller,
            store,
            locker,
            Arc::new(ReplicationLevelCache::new()),
            time_provider,
        );
        job.execute().await;
        assert_eq!(job.num_launched(), 1);
        assert_eq!(job.num_success(), 1);
        assert_eq!(job.result().deleted.len(), 1);
    }
}
