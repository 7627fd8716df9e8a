use crate::controller::Controller;
use crate::locker::{Chunk, ChunkLocker};
use crate::store::ReplicaStore;
use async_trait::async_trait;
use observability_deps::tracing::info;
use qserv_job::{Job, JobContext};
use qserv_proto::ResponseStatus;
use std::sync::Arc;

/// Moves one chunk's replica from `source_worker` to `destination_worker`: create at the
/// destination first, then delete at the source, never leaving a window with zero copies.
pub struct MoveReplicaJob {
    context: JobContext,
    database: String,
    chunk: u32,
    source_worker: String,
    destination_worker: String,
    controller: Arc<Controller>,
    store: Arc<dyn ReplicaStore>,
    locker: Arc<ChunkLocker>,
}

impl MoveReplicaJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: JobContext,
        database: impl Into<String>,
        chunk: u32,
        source_worker: impl Into<String>,
        destination_worker: impl Into<String>,
        controller: Arc<Controller>,
        store: Arc<dyn ReplicaStore>,
        locker: Arc<ChunkLocker>,
    ) -> Self {
        Self {
            context,
            database: database.into(),
            chunk,
            source_worker: source_worker.into(),
            destination_worker: destination_worker.into(),
            controller,
            store,
            locker,
        }
    }
}

#[async_trait]
impl Job for MoveReplicaJob {
    fn context(&self) -> &JobContext {
        &self.context
    }

    async fn run(&self) -> Result<(), String> {
        if self.source_worker == self.destination_worker {
            return Ok(());
        }

        let chunk_key = Chunk::new(&self.database, self.chunk);
        if !self
            .locker
            .lock(chunk_key.clone(), &self.context.id)
            .map_err(|e| e.to_string())?
        {
            return Err(format!("chunk {} is locked by another owner", chunk_key));
        }

        let create = self
            .controller
            .replica_create(&self.destination_worker, &self.database, self.chunk)
            .await
            .map_err(|e| e.to_string())?;
        if create.status != ResponseStatus::Success {
            self.locker.release(&chunk_key);
            return Err(format!(
                "destination worker {} rejected replica create",
                self.destination_worker
            ));
        }

        let delete = self
            .controller
            .replica_delete(&self.source_worker, &self.database, self.chunk)
            .await
            .map_err(|e| e.to_string())?;
        self.locker.release(&chunk_key);
        if delete.status != ResponseStatus::Success {
            return Err(format!(
                "source worker {} rejected replica delete after move",
                self.source_worker
            ));
        }

        self.store
            .delete_replica(&self.database, self.chunk, &self.source_worker)
            .await
            .map_err(|e| e.to_string())?;
        info!(
            chunk = self.chunk,
            from = %self.source_worker,
            to = %self.destination_worker,
            "moved replica"
        );
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
    async fn moving_to_the_same_worker_is_a_no_op() {
        let client = Arc::new(MockWorkerClient::default());
        let controller = Arc::new(Controller::new(ControllerIdentity::new("czar-1", 1), client, Arc::new(SystemProvider::new())));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let locker = Arc::new(ChunkLocker::new());
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());

        let job = MoveReplicaJob::new(
            JobContext::new("move-1", &time_provider),
            "lsst",
            3,
            "worker-a",
            "worker-a",
            controller,
            store,
            locker,
        );
        assert_eq!(job.run().await, Ok(()));
    }

    #[tokio::test]
    async fn move_leaves_the_chunk_unlocked_once_finished() {
        let client = Arc::new(MockWorkerClient::default());
        let controller = Arc::new(Controller::new(ControllerIdentity::new("czar-1", 1), client, Arc::new(SystemProvider::new())));
        let store: Arc<dyn ReplicaStore> = Arc::new(InMemoryReplicaStore::default());
        let locker = Arc::new(ChunkLocker::new());
        let time_provider: TimeProviderRef = Arc::new(SystemProvider::new());

        let job = MoveReplicaJob::new(
            JobContext::new("move-2", &time_provider),
            "lsst",
            3,
            "worker-a",
            "worker-b",
            controller,
            store,
            locker.clone(),
        );
        job.run().await.unwrap();
        assert!(!locker.is_locked(&Chunk::new("lsst", 3)));
    }
}
