use crate::controller::Controller;
use crate::jobs::find_all::FindAllJob;
use crate::locker::{Chunk, ChunkLocker};
use crate::replica_info::ReplicaStatus;
use crate::store::ReplicaStore;
use async_trait::async_trait;
use observability_deps::tracing::{info, warn};
use parking_lot::Mutex;
use qserv_job::{Job, JobContext};
use qserv_proto::ResponseStatus;
use qserv_time::TimeProviderRef;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How many times [`FixUpJob`] re-runs its [`FindAllJob`] precursor and retries whatever still
/// isn't complete, before giving up on the remainder for this pass.
const MAX_RESTARTS: u32 = 3;

#[derive(Debug, Default, Clone)]
pub struct FixUpJobResult {
    /// `chunk, worker` recreated after being found incomplete or missing.
    pub fixed: Vec<(u32, String)>,
    /// How many times the precursor was re-run because replicas were still incomplete.
    pub restarts: u32,
}

/// Recreates any replica a precursor [`FindAllJob`] reports as
/// [`ReplicaStatus::Incomplete`] or [`ReplicaStatus::NotFound`], the companion to
/// [`super::replicate::ReplicateJob`]: that one adds copies to meet a target count, this one
/// repairs copies that exist in name but failed verification.
///
/// A replica can still be incomplete right after being recreated, e.g. if the worker's create
/// races with something else touching the chunk, so the whole find-all-then-fix pass is retried
/// up to [`MAX_RESTARTS`] times rather than giving up after one round.
pub struct FixUpJob {
    context: JobContext,
    database: String,
    workers: Vec<String>,
    controller: Arc<Controller>,
    store: Arc<dyn ReplicaStore>,
    locker: Arc<ChunkLocker>,
    time_provider: TimeProviderRef,
    num_fixed: AtomicUsize,
    result: Mutex<FixUpJobResult>,
}

impl FixUpJob {
    pub fn new(
        context: JobContext,
        database: impl Into<String>,
        workers: Vec<String>,
        controller: Arc<Controller>,
        store: Arc<dyn ReplicaStore>,
        locker: Arc<ChunkLocker>,
        time_provider: TimeProviderRef,
    ) -> Self {
        Self {
            context,
            database: database.into(),
            workers,
            controller,
            store,
            locker,
            time_provider,
            num_fixed: AtomicUsize::new(0),
            result: Mutex::new(FixUpJobResult::default()),
        }
    }

    pub fn result(&self) -> FixUpJobResult {
        self.result.lock().clone()
    }

    pub fn num_fixed(&self) -> usize {
        self.num_fixed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for FixUpJob {
    fn context(&self) -> &JobContext {
        &self.context
    }

    async fn run(&self) -> Result<(), String> {
        for restart in 0..=MAX_RESTARTS {
            if restart > 0 {
                info!(restart, "re-running find-all precursor, replicas remained incomplete");
                self.result.lock().restarts = restart;
            }
            if self.context.is_cancelled() {
                break;
            }

            let precursor = FindAllJob::new(
                JobContext::new(format!("{}-find-all-{}", self.context.id, restart), &self.time_provider),
                &self.database,
                self.workers.clone(),
                self.controller.clone(),
                self.store.clone(),
            );
            precursor.execute().await;
            let precursor_result = precursor.result();

            let mut still_incomplete = false;
            for replica in &precursor_result.replicas {
                if self.context.is_cancelled() {
                    break;
                }
                if replica.status == ReplicaStatus::Complete {
                    continue;
                }

                let chunk_key = Chunk::new(&self.database, replica.chunk);
                if !self
                    .locker
                    .lock(chunk_key.clone(), &self.context.id)
                    .map_err(|e| e.to_string())?
                {
                    still_incomplete = true;
                    continue;
                }

                match self
                    .controller
                    .replica_create(&replica.worker, &self.database, replica.chunk)
                    .await
                {
                    Ok(response) if response.status == ResponseStatus::Success => {
                        self.num_fixed.fetch_add(1, Ordering::SeqCst);
                        info!(chunk = replica.chunk, worker = %replica.worker, "fixed up replica");
                        self.result.lock().fixed.push((replica.chunk, replica.worker.clone()));
                    }
                    Ok(_) => {
                        warn!(chunk = replica.chunk, worker = %replica.worker, "fix-up rejected by worker");
                        still_incomplete = true;
                    }
                    Err(e) => {
                        warn!(chunk = replica.chunk, worker = %replica.worker, error = %e, "fix-up request failed");
                        still_incomplete = true;
                    }
                }
                self.locker.release(&chunk_key);
            }

            if !still_incomplete {
                break;
            }
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
    async fn fixup_recreates_every_replica_the_precursor_found() {
        // MockWorkerClient never reports the payload shape fixup needs to tell complete from
        // incomplete apart from FindAllJob's own hardcoded `ReplicaStatus::Complete`, so this
        // exercises the no-incomplete-replicas path: nothing to fix, no requests issued.
        let client = Arc::new(MockWorkerClient::default());
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());
        let controller = Arc::new(Controller::new(ControllerIdentity::new("czar-1", 1), client, time_provider.clone()));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let locker = Arc::new(ChunkLocker::new());

        let job = FixUpJob::new(
            JobContext::new("fixup-1", &time_provider),
            "lsst",
            vec!["worker-a".to_string()],
            controller,
            store,
            locker,
            time_provider,
        );
        job.execute().await;
        assert_eq!(job.num_fixed(), 0);
    }
}
