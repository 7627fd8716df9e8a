use crate::job_query::{JobDescription, JobQuery};
use crate::merger::{InfileMerger, MergeOutcome};
use crate::pool::{Command, PriorityCommandPool};
use crate::request::{Messenger, MessengerError};
use observability_deps::tracing::{debug, warn};
use qserv_proto::{Request, RequestPayload, RequestType, ResponseStatus};
use qserv_query::SelectStmt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracker::TaskState;

/// Owns every [`JobQuery`] dispatched for a single user query: hands each one to the shared
/// priority pool, updates its tracker from the worker's response, and lets the caller cancel or
/// wait on the whole set at once.
#[derive(Debug)]
pub struct Executive {
    pool: Arc<PriorityCommandPool>,
    messenger: Arc<dyn Messenger>,
    merger: Arc<InfileMerger>,
    jobs: Mutex<HashMap<i32, Arc<JobQuery>>>,
    squashed: AtomicBool,
}

impl Executive {
    pub fn new(pool: Arc<PriorityCommandPool>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            pool,
            messenger,
            merger: Arc::new(InfileMerger::new()),
            jobs: Mutex::new(HashMap::new()),
            squashed: AtomicBool::new(false),
        }
    }

    /// Register a job and queue it for dispatch at `priority`. Returns the tracked handle so the
    /// caller can await its terminal state.
    pub fn add(&self, description: JobDescription, priority: i32) -> Arc<JobQuery> {
        let job = Arc::new(JobQuery::new(description));
        self.jobs.lock().insert(job.id(), job.clone());

        if self.squashed.load(Ordering::SeqCst) {
            job.cancel();
            return job;
        }

        let cmd = dispatch_command(
            job.clone(),
            self.messenger.clone(),
            self.pool.clone(),
            self.merger.clone(),
            priority,
        );
        self.pool.queue_cmd_with_priority(cmd, priority);
        job
    }

    pub fn job(&self, id: i32) -> Option<Arc<JobQuery>> {
        self.jobs.lock().get(&id).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Cancel every job, in flight or not yet dispatched.
    pub fn squash(&self) {
        self.squashed.store(true, Ordering::SeqCst);
        for job in self.jobs.lock().values() {
            job.cancel();
        }
    }

    /// Wait for every job to reach a terminal state. Returns `true` iff all of them succeeded.
    pub async fn join(&self) -> bool {
        let jobs: Vec<_> = self.jobs.lock().values().cloned().collect();
        let mut all_succeeded = true;
        for job in jobs {
            let state = job.wait_terminal().await;
            if state != TaskState::Success {
                all_succeeded = false;
            }
        }
        all_succeeded
    }

    /// Build the final [`MergeOutcome`] from every chunk result table recorded so far. Call
    /// after [`Self::join`] returns; `merge_stmt` and `merge_table` come from the
    /// [`QuerySession`](../qserv_qproc/struct.QuerySession.html) that produced this query's jobs.
    pub fn finalize(&self, merge_stmt: Option<&SelectStmt>, merge_table: &str) -> MergeOutcome {
        self.merger.finalize(merge_stmt, merge_table)
    }
}

/// Build the dispatch command for one attempt at running `job`, the same closure shape used
/// both for the job's first dispatch and for re-enqueueing it after a retryable failure.
fn dispatch_command(
    job: Arc<JobQuery>,
    messenger: Arc<dyn Messenger>,
    pool: Arc<PriorityCommandPool>,
    merger: Arc<InfileMerger>,
    priority: i32,
) -> Command {
    Box::new(move || {
        Box::pin(async move {
            run_job(job, messenger, pool, merger, priority).await;
        })
    })
}

async fn run_job(
    job: Arc<JobQuery>,
    messenger: Arc<dyn Messenger>,
    pool: Arc<PriorityCommandPool>,
    merger: Arc<InfileMerger>,
    priority: i32,
) {
    if job.is_cancelled() {
        job.tracker().finish(TaskState::Cancelled);
        return;
    }
    if !job.record_attempt() {
        job.tracker().finish(TaskState::Failed);
        return;
    }
    job.tracker().start();
    pool.command_start(priority);

    let desc = job.description();
    let request = Request {
        id: desc.id.to_string(),
        request_type: RequestType::Sql,
        priority,
        payload: RequestPayload::Sql {
            chunk_query_spec: desc.chunk_query_spec.queries.join(";\n"),
        },
    };

    let outcome = messenger.send(request).await;
    pool.command_finish(priority);

    match outcome {
        Ok(response) if response.status == ResponseStatus::Success => {
            debug!(job_id = job.id(), "job completed successfully");
            merger.record_result_table(job.description().resultant_table.clone());
            job.tracker().finish(TaskState::Success);
        }
        Ok(response) => {
            warn!(job_id = job.id(), status = ?response.status, "worker reported failure");
            job.tracker().finish(TaskState::Failed);
        }
        Err(MessengerError::ConnectionClosed) => {
            warn!(
                job_id = job.id(),
                attempts = job.run_attempts(),
                "worker connection dropped, re-enqueueing for another attempt"
            );
            let cmd = dispatch_command(job.clone(), messenger.clone(), pool.clone(), merger.clone(), priority);
            pool.queue_cmd_with_priority(cmd, priority);
        }
        Err(e) => {
            warn!(job_id = job.id(), error = %e, "dispatch failed");
            job.tracker().finish(TaskState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_support::MockMessenger;
    use qserv_plugins::ScanInfo;
    use qserv_qproc::ChunkQuerySpec;

    fn description(id: i32) -> JobDescription {
        JobDescription {
            id,
            chunk_id: 1,
            chunk_query_spec: ChunkQuerySpec::new("lsst", 1, ScanInfo::default(), true),
            resultant_table: format!("result_{id}"),
        }
    }

    #[tokio::test]
    async fn dispatching_a_job_against_a_successful_worker_finishes_success() {
        let pool = Arc::new(PriorityCommandPool::new());
        let messenger = Arc::new(MockMessenger {
            reply_status: ResponseStatus::Success,
            ..Default::default()
        });
        let exec = Executive::new(pool.clone(), messenger.clone());
        let job = exec.add(description(1), 0);

        let cmd = pool.get_cmd().await.unwrap();
        cmd().await;

        assert_eq!(job.wait_terminal().await, TaskState::Success);
        assert_eq!(messenger.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connection_closed_is_retried_until_it_succeeds() {
        let pool = Arc::new(PriorityCommandPool::new());
        let messenger = Arc::new(MockMessenger {
            reply_status: ResponseStatus::Success,
            fail_connections: 2,
            ..Default::default()
        });
        let exec = Executive::new(pool.clone(), messenger.clone());
        let job = exec.add(description(3), 0);

        for _ in 0..3 {
            let cmd = pool.get_cmd().await.unwrap();
            cmd().await;
        }

        assert_eq!(job.wait_terminal().await, TaskState::Success);
        assert_eq!(messenger.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn connection_closed_retries_exhaust_after_max_retries_then_fails() {
        let pool = Arc::new(PriorityCommandPool::new());
        let messenger = Arc::new(MockMessenger {
            reply_status: ResponseStatus::Success,
            fail_connections: usize::MAX,
            ..Default::default()
        });
        let exec = Executive::new(pool.clone(), messenger.clone());
        let job = exec.add(description(4), 0);

        for _ in 0..6 {
            let cmd = pool.get_cmd().await.unwrap();
            cmd().await;
        }

        assert_eq!(job.wait_terminal().await, TaskState::Failed);
        assert_eq!(messenger.sent.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn finalize_after_join_lists_every_successful_jobs_result_table() {
        let pool = Arc::new(PriorityCommandPool::new());
        let messenger = Arc::new(MockMessenger {
            reply_status: ResponseStatus::Success,
            ..Default::default()
        });
        let exec = Executive::new(pool.clone(), messenger.clone());
        let job_a = exec.add(description(10), 0);
        let job_b = exec.add(description(11), 0);

        for _ in 0..2 {
            let cmd = pool.get_cmd().await.unwrap();
            cmd().await;
        }

        assert!(exec.join().await);
        assert_eq!(job_a.wait_terminal().await, TaskState::Success);
        assert_eq!(job_b.wait_terminal().await, TaskState::Success);

        let outcome = exec.finalize(None, "merge_table");
        let mut tables = outcome.result_tables;
        tables.sort();
        assert_eq!(tables, vec!["result_10".to_string(), "result_11".to_string()]);
    }

    #[tokio::test]
    async fn squash_cancels_every_registered_job() {
        let pool = Arc::new(PriorityCommandPool::new());
        let messenger = Arc::new(MockMessenger::default());
        let exec = Executive::new(pool, messenger);
        let job = exec.add(description(2), 0);
        exec.squash();
        assert!(job.is_cancelled());
    }
}
