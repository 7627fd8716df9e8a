use crate::status::JobStatus;
use async_trait::async_trait;
use observability_deps::tracing::{debug, warn};
use qserv_time::{TimeProvider, TimeProviderRef, TimestampMillis};
use std::sync::Arc;
use tracker::{TaskHandle, TaskState, TaskTracker};

/// Shared bookkeeping every concrete job (`FindAll`, `Replicate`, `Purge`, ...) embeds: an
/// identifier, the underlying [`TaskTracker`] driving its [`JobStatus`], and when it was
/// created, so a controller can list/age out jobs without each job reimplementing this.
#[derive(Debug)]
pub struct JobContext {
    pub id: String,
    pub created_time: TimestampMillis,
    tracker: TaskHandle,
}

impl JobContext {
    pub fn new(id: impl Into<String>, time_provider: &TimeProviderRef) -> Self {
        Self {
            id: id.into(),
            created_time: time_provider.now_millis(),
            tracker: Arc::new(TaskTracker::new()),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.tracker.state().into()
    }

    pub fn is_cancelled(&self) -> bool {
        self.tracker.is_cancelled()
    }

    pub fn tracker(&self) -> &TaskHandle {
        &self.tracker
    }
}

/// A schedulable, cancellable unit of replication work tracked end-to-end through
/// [`PrimaryStatus`](crate::PrimaryStatus)/[`ExtendedStatus`](crate::ExtendedStatus).
///
/// Implementors provide `run`; [`Job::execute`] wraps it with the tracker transitions and log
/// lines every job needs, mirroring how the original job base class centralized `startImpl`/
/// `notify` bookkeeping around each job type's own logic.
#[async_trait]
pub trait Job: Send + Sync {
    fn context(&self) -> &JobContext;

    /// The job-specific work. Implementors should check
    /// [`JobContext::is_cancelled`] at natural checkpoints and return early.
    async fn run(&self) -> Result<(), String>;

    fn id(&self) -> &str {
        &self.context().id
    }

    fn status(&self) -> JobStatus {
        self.context().status()
    }

    fn cancel(&self) {
        self.context().tracker().cancel();
    }

    /// Start the job if it hasn't already started or been cancelled, run it to completion, and
    /// record the outcome. Returns the final [`JobStatus`].
    async fn execute(&self) -> JobStatus {
        let ctx = self.context();
        if !ctx.tracker().start() {
            debug!(job_id = %ctx.id, "job not started: already terminal or cancelled");
            return ctx.status();
        }
        debug!(job_id = %ctx.id, "job started");
        match self.run().await {
            Ok(()) if ctx.is_cancelled() => {
                ctx.tracker().finish(TaskState::Cancelled);
            }
            Ok(()) => {
                ctx.tracker().finish(TaskState::Success);
            }
            Err(reason) => {
                warn!(job_id = %ctx.id, %reason, "job failed");
                ctx.tracker().finish(TaskState::Failed);
            }
        }
        ctx.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qserv_time::{SystemProvider, TimeProvider};

    struct AlwaysSucceeds(JobContext);

    #[async_trait]
    impl Job for AlwaysSucceeds {
        fn context(&self) -> &JobContext {
            &self.0
        }
        async fn run(&self) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysFails(JobContext);

    #[async_trait]
    impl Job for AlwaysFails {
        fn context(&self) -> &JobContext {
            &self.0
        }
        async fn run(&self) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    fn time_provider() -> TimeProviderRef {
        Arc::new(SystemProvider::new())
    }

    #[tokio::test]
    async fn successful_job_reaches_finished_success() {
        let job = AlwaysSucceeds(JobContext::new("job-1", &time_provider()));
        let status = job.execute().await;
        assert!(status.is_finished());
        assert_eq!(status.extended, crate::status::ExtendedStatus::Success);
    }

    #[tokio::test]
    async fn failing_job_reaches_finished_failed() {
        let job = AlwaysFails(JobContext::new("job-2", &time_provider()));
        let status = job.execute().await;
        assert!(status.is_finished());
        assert_eq!(status.extended, crate::status::ExtendedStatus::Failed);
    }

    #[tokio::test]
    async fn cancelling_before_execute_prevents_start() {
        let job = AlwaysSucceeds(JobContext::new("job-3", &time_provider()));
        job.cancel();
        let status = job.execute().await;
        assert_eq!(status.primary, crate::status::PrimaryStatus::Created);
    }
}
