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
pub struct ReplicateJobResult {
    /// `chunk -> worker` for every replica this job created.
    pub created: Vec<(u32, String)>,
    pub workers: BTreeMap<String, bool>,
}

/// Brings every chunk in `database` up to `num_replicas` copies, choosing destination workers
/// from `workers` by ascending current replica count among those that don't already hold the
/// chunk, same as the ingest placement algorithm's least-loaded preference.
///
/// Chains a [`FindAllJob`] first to learn current disposition, exactly as the original
/// replication tool does before deciding what to create.
pub struct ReplicateJob {
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
    result: Mutex<ReplicateJobResult>,
}

impl ReplicateJob {
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
            result: Mutex::new(ReplicateJobResult::default()),
        }
    }

    pub fn result(&self) -> ReplicateJobResult {
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
impl Job for ReplicateJob {
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
            if current_holders.len() as u32 >= self.num_replicas {
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

            let needed = self.num_replicas - current_holders.len() as u32;
            let mut load_by_worker: HashMap<&String, usize> = HashMap::new();
            for worker in &self.workers {
                if current_holders.contains(worker) {
                    continue;
                }
                let count = self
                    .store
                    .find_replicas_by_worker(worker)
                    .await
                    .map_err(|e| e.to_string())?
                    .len();
                load_by_worker.insert(worker, count);
            }
            let mut candidates: Vec<&String> = self
                .workers
                .iter()
                .filter(|w| !current_holders.contains(w))
                .collect();
            candidates.sort_by_key(|w| (*load_by_worker.get(w).unwrap_or(&0), w.as_str()));
            candidates.truncate(needed as usize);

            for worker in candidates {
                self.num_launched.fetch_add(1, Ordering::SeqCst);
                match self.controller.replica_create(worker, &self.database, chunk).await {
                    Ok(response) if response.status == ResponseStatus::Success => {
                        self.num_success.fetch_add(1, Ordering::SeqCst);
                        info!(chunk, worker, "created replica");
                        let mut result = self.result.lock();
                        result.created.push((chunk, worker.clone()));
                        result.workers.insert(worker.clone(), true);
                    }
                    Ok(_) => {
                        self.result.lock().workers.insert(worker.clone(), false);
                    }
                    Err(e) => {
                        warn!(chunk, worker, error = %e, "replica create failed");
                        self.result.lock().workers.insert(worker.clone(), false);
                    }
                }
            }
            self.locker.release(&chunk_key);
        }

        if !holders.is_empty() {
            // Level is the fraction of chunks sitting at exactly the target count, so both this
            // job and PurgeJob can treat a level of 1.0 as "nothing to do".
            let satisfied = holders.values().filter(|w| w.len() as u32 == self.num_replicas).count();
            let level = satisfied as f64 / holders.len() as f64;
            self.level_cache.set(&self.database, level, self.time_provider.now_millis());
        }
        Ok(())
    }
}
