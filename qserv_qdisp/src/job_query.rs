use observability_deps::tracing::{debug, warn};
use qserv_qproc::ChunkQuerySpec;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracker::{TaskHandle, TaskState, TaskTracker};

/// No solid value-with-reason has ever been attached to this; kept as the original default.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// What a worker request for one chunk needs to run: where to send it and what to run there.
#[derive(Debug, Clone)]
pub struct JobDescription {
    pub id: i32,
    pub chunk_id: i32,
    pub chunk_query_spec: ChunkQuerySpec,
    pub resultant_table: String,
}

/// Describes, monitors and controls a single chunk query dispatched to a worker: tracks run
/// attempts against a retry ceiling and exposes the same terminal-state lifecycle every other
/// tracked unit of work in this workspace uses.
#[derive(Debug)]
pub struct JobQuery {
    description: JobDescription,
    tracker: TaskHandle,
    run_attempts: AtomicUsize,
    max_retries: usize,
}

impl JobQuery {
    pub fn new(description: JobDescription) -> Self {
        Self::with_max_retries(description, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(description: JobDescription, max_retries: usize) -> Self {
        Self {
            description,
            tracker: TaskHandle::new(TaskTracker::new()),
            run_attempts: AtomicUsize::new(0),
            max_retries,
        }
    }

    pub fn id(&self) -> i32 {
        self.description.id
    }

    pub fn description(&self) -> &JobDescription {
        &self.description
    }

    pub fn tracker(&self) -> &TaskHandle {
        &self.tracker
    }

    pub fn is_cancelled(&self) -> bool {
        self.tracker.is_cancelled()
    }

    pub fn cancel(&self) {
        self.tracker.cancel();
    }

    pub fn run_attempts(&self) -> usize {
        self.run_attempts.load(Ordering::SeqCst)
    }

    /// Record one more run attempt. Returns `false` once the retry ceiling is hit, at which
    /// point the caller must give up and mark the job failed rather than retry again.
    pub fn record_attempt(&self) -> bool {
        let attempts = self.run_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts > self.max_retries {
            warn!(
                job_id = self.description.id,
                attempts, max_retries = self.max_retries, "job exceeded retry ceiling"
            );
            return false;
        }
        debug!(job_id = self.description.id, attempts, "job run attempt");
        true
    }

    pub async fn wait_terminal(&self) -> TaskState {
        self.tracker.wait_terminal().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qserv_plugins::ScanInfo;

    fn job(id: i32) -> JobQuery {
        JobQuery::new(JobDescription {
            id,
            chunk_id: 1,
            chunk_query_spec: ChunkQuerySpec::new("lsst", 1, ScanInfo::default(), true),
            resultant_table: "result_1".to_string(),
        })
    }

    #[test]
    fn record_attempt_fails_past_the_retry_ceiling() {
        let j = JobQuery::with_max_retries(job(1).description, 2);
        assert!(j.record_attempt());
        assert!(j.record_attempt());
        assert!(!j.record_attempt());
    }

    #[tokio::test]
    async fn cancel_is_visible_through_is_cancelled() {
        let j = job(2);
        assert!(!j.is_cancelled());
        j.cancel();
        assert!(j.is_cancelled());
    }
}
