use crate::controller::Controller;
use crate::jobs::find_all::FindAllJob;
use crate::locker::{Chunk, ChunkLocker};
use crate::store::ReplicaStore;
use async_trait::async_trait;
use observability_deps::tracing::{info, warn};
use parking_lot::Mutex;
use qserv_job::{Job, JobContext};
use qserv_proto::ResponseStatus;
use qserv_time::TimeProviderRef;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct RebalanceJobResult {
    /// `chunk, from, to` for every replica this job moved.
    pub moved: Vec<(u32, String, String)>,
}

/// `startPercent`/`stopPercent` fall outside their mandated ranges, or don't leave at least a
/// 5-point gap between them.
#[derive(Debug, thiserror::Error)]
#[error("invalid rebalance thresholds: start_percent must be in [10,50], stop_percent in [5,45], and start_percent - stop_percent >= 5 (got start={start_percent}, stop={stop_percent})")]
pub struct InvalidRebalanceThresholds {
    pub start_percent: u32,
    pub stop_percent: u32,
}

/// Evens out how many chunks each worker holds for `database`, independent of replication
/// factor: no grounding file for this job shape existed in the retrieval pack, so it is modeled
/// directly on [`super::purge::PurgeJob`]/[`super::replicate::ReplicateJob`]'s precursor +
/// per-chunk-lock-then-act structure, just driven by per-worker load instead of replica count.
///
/// A chunk is a move candidate once the busiest worker's load exceeds the mean by more than
/// `start_percent` percent of the mean; once started, chunks keep moving off it until its load
/// falls back to within `stop_percent` percent of the mean, the lower of the two thresholds so
/// the job doesn't immediately re-trigger at the boundary.
pub struct RebalanceJob {
    context: JobContext,
    database: String,
    workers: Vec<String>,
    start_percent: u32,
    stop_percent: u32,
    controller: Arc<Controller>,
    store: Arc<dyn ReplicaStore>,
    locker: Arc<ChunkLocker>,
    time_provider: TimeProviderRef,
    result: Mutex<RebalanceJobResult>,
    num_moved: AtomicUsize,
}

impl RebalanceJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: JobContext,
        database: impl Into<String>,
        workers: Vec<String>,
        start_percent: u32,
        stop_percent: u32,
        controller: Arc<Controller>,
        store: Arc<dyn ReplicaStore>,
        locker: Arc<ChunkLocker>,
        time_provider: TimeProviderRef,
    ) -> Result<Self, InvalidRebalanceThresholds> {
        if !(10..=50).contains(&start_percent)
            || !(5..=45).contains(&stop_percent)
            || start_percent < stop_percent
            || start_percent - stop_percent < 5
        {
            return Err(InvalidRebalanceThresholds {
                start_percent,
                stop_percent,
            });
        }
        Ok(Self {
            context,
            database: database.into(),
            workers,
            start_percent,
            stop_percent,
            controller,
            store,
            locker,
            time_provider,
            result: Mutex::new(RebalanceJobResult::default()),
            num_moved: AtomicUsize::new(0),
        })
    }

    pub fn result(&self) -> RebalanceJobResult {
        self.result.lock().clone()
    }

    pub fn num_moved(&self) -> usize {
        self.num_moved.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for RebalanceJob {
    fn context(&self) -> &JobContext {
        &self.context
    }

    async fn run(&self) -> Result<(), String> {
        if self.workers.len() < 2 {
            return Ok(());
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

        let mut by_worker: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for w in &self.workers {
            by_worker.entry(w.clone()).or_default();
        }
        for replica in &precursor_result.replicas {
            by_worker.entry(replica.worker.clone()).or_default().push(replica.chunk);
        }

        let total_chunks: usize = by_worker.values().map(|v| v.len()).sum();
        let mean = total_chunks as f64 / by_worker.len() as f64;
        let start_threshold = mean * (1.0 + self.start_percent as f64 / 100.0);
        let stop_threshold = mean * (1.0 + self.stop_percent as f64 / 100.0);

        let busiest_at_start = by_worker.values().map(|c| c.len()).max().unwrap_or(0);
        if (busiest_at_start as f64) <= start_threshold {
            return Ok(());
        }

        loop {
            if self.context.is_cancelled() {
                break;
            }
            let busiest = by_worker
                .iter()
                .max_by_key(|(_, chunks)| chunks.len())
                .map(|(w, c)| (w.clone(), c.len()));
            let idlest = by_worker
                .iter()
                .min_by_key(|(_, chunks)| chunks.len())
                .map(|(w, c)| (w.clone(), c.len()));

            let (from, from_len, to, to_len) = match (busiest, idlest) {
                (Some((from, from_len)), Some((to, to_len))) => (from, from_len, to, to_len),
                _ => break,
            };
            if from == to || (from_len as f64) <= stop_threshold {
                break;
            }
            if to_len as f64 >= mean {
                break;
            }

            let chunk = match by_worker.get(&from).and_then(|c| c.first().copied()) {
                Some(c) => c,
                None => break,
            };

            let chunk_key = Chunk::new(&self.database, chunk);
            if !self
                .locker
                .lock(chunk_key.clone(), &self.context.id)
                .map_err(|e| e.to_string())?
            {
                by_worker.get_mut(&from).unwrap().retain(|&c| c != chunk);
                continue;
            }

            let create = self.controller.replica_create(&to, &self.database, chunk).await;
            let moved = match create {
                Ok(response) if response.status == ResponseStatus::Success => {
                    let delete = self.controller.replica_delete(&from, &self.database, chunk).await;
                    match delete {
                        Ok(d) if d.status == ResponseStatus::Success => {
                            self.store
                                .delete_replica(&self.database, chunk, &from)
                                .await
                                .map_err(|e| e.to_string())?;
                            true
                        }
                        _ => {
                            warn!(chunk, from = %from, "rebalance delete-from-source failed after create");
                            false
                        }
                    }
                }
                _ => {
                    warn!(chunk, to = %to, "rebalance create-at-destination failed");
                    false
                }
            };
            self.locker.release(&chunk_key);

            if moved {
                self.num_moved.fetch_add(1, Ordering::SeqCst);
                info!(chunk, from = %from, to = %to, "rebalanced replica");
                self.result.lock().moved.push((chunk, from.clone(), to.clone()));
                by_worker.get_mut(&from).unwrap().retain(|&c| c != chunk);
                by_worker.get_mut(&to).unwrap().push(chunk);
            } else {
                by_worker.get_mut(&from).unwrap().retain(|&c| c != chunk);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerError, ControllerIdentity, WorkerClient};
    use crate::store::test_support::InMemoryReplicaStore;
    use async_trait::async_trait;
    use qserv_proto::{ExtendedStatus, Performance, Request, RequestType, Response, ResponsePayload};
    use qserv_time::SystemProvider;

    /// Reports `worker-a` as holding chunk 1, `worker-b` as holding none, and accepts every
    /// create/delete so [`RebalanceJob`] has real skew to correct.
    #[derive(Debug, Default)]
    struct SkewedWorkerClient;

    #[async_trait]
    impl WorkerClient for SkewedWorkerClient {
        async fn send(&self, worker: &str, request: Request) -> Result<Response, ControllerError> {
            let payload = match request.request_type {
                RequestType::ReplicaFindAll if worker == "worker-a" => Some(ResponsePayload::ReplicaInfo {
                    chunk: 1,
                    checksum: None,
                    co_located: false,
                }),
                RequestType::ReplicaFindAll => None,
                _ => Some(ResponsePayload::ReplicaInfo {
                    chunk: 1,
                    checksum: None,
                    co_located: false,
                }),
            };
            Ok(Response {
                id: request.id,
                status: ResponseStatus::Success,
                extended_status: ExtendedStatus::None,
                performance: Performance::default(),
                payload,
            })
        }
    }

    #[tokio::test]
    async fn single_worker_database_never_triggers_a_move() {
        let client = Arc::new(SkewedWorkerClient);
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());
        let controller = Arc::new(Controller::new(ControllerIdentity::new("czar-1", 1), client, time_provider.clone()));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let locker = Arc::new(ChunkLocker::new());

        let job = RebalanceJob::new(
            JobContext::new("rebalance-1", &time_provider),
            "lsst",
            vec!["worker-a".to_string()],
            10,
            5,
            controller,
            store,
            locker,
            time_provider,
        )
        .unwrap();
        job.execute().await;
        assert_eq!(job.num_moved(), 0);
    }

    #[tokio::test]
    async fn thresholds_outside_their_mandated_ranges_are_rejected() {
        let client = Arc::new(SkewedWorkerClient);
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());
        let controller = Arc::new(Controller::new(ControllerIdentity::new("czar-1", 1), client, time_provider.clone()));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let locker = Arc::new(ChunkLocker::new());

        let err = RebalanceJob::new(
            JobContext::new("rebalance-2", &time_provider),
            "lsst",
            vec!["worker-a".to_string(), "worker-b".to_string()],
            10,
            8,
            controller,
            store,
            locker,
            time_provider,
        )
        .unwrap_err();
        assert_eq!(err.start_percent, 10);
        assert_eq!(err.stop_percent, 8);
    }
}
