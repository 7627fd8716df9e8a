//! A small state machine shared by every long-running, cancellable unit of work in this
//! workspace: a dispatched [`JobQuery`](../../qserv_qdisp/index.html) and a replication
//! [`Job`](../../qserv_job/index.html) both build on the same `CREATED -> RUNNING -> {SUCCESS,
//! FAILED, CANCELLED}` shape, so it lives here once instead of being reimplemented per crate.

use observability_deps::tracing::debug;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// Terminal or non-terminal state of a tracked unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed but not yet started.
    Created,
    /// Actively running.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
}

impl TaskState {
    /// Whether this is one of `{Success, Failed, Cancelled}`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// Shared state for a single tracked task: current [`TaskState`], a cooperative cancel flag, and
/// a `Notify` so `join`-style callers can wait for a terminal state without polling.
#[derive(Debug)]
pub struct TaskTracker {
    state: Mutex<TaskState>,
    cancelled: AtomicBool,
    notify: Notify,
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTracker {
    /// Construct a tracker in [`TaskState::Created`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Created),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Move to `Running`. No-op (returns `false`) if already terminal or cancelled.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() || self.is_cancelled() {
            return false;
        }
        *state = TaskState::Running;
        true
    }

    /// Cooperative cancellation: sets the flag and wakes any `wait_terminal` callers. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Transition to a terminal state, waking any waiters. No-op if already terminal.
    pub fn finish(&self, outcome: TaskState) {
        debug_assert!(outcome.is_terminal(), "finish() requires a terminal state");
        let mut state = self.state.lock();
        if state.is_terminal() {
            return;
        }
        *state = outcome;
        drop(state);
        debug!(?outcome, "task reached terminal state");
        self.notify.notify_waiters();
    }

    /// Block until the task reaches a terminal state, returning it.
    pub async fn wait_terminal(&self) -> TaskState {
        loop {
            let notified = self.notify.notified();
            {
                let state = *self.state.lock();
                if state.is_terminal() {
                    return state;
                }
            }
            notified.await;
        }
    }
}

/// A reference-counted handle to a [`TaskTracker`], cheap to clone and share between the owner
/// and a non-owning callback.
pub type TaskHandle = Arc<TaskTracker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_then_finish_reaches_terminal_state() {
        let t = TaskTracker::new();
        assert_eq!(t.state(), TaskState::Created);
        assert!(t.start());
        assert_eq!(t.state(), TaskState::Running);
        t.finish(TaskState::Success);
        assert_eq!(t.wait_terminal().await, TaskState::Success);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_blocks_start() {
        let t = TaskTracker::new();
        t.cancel();
        t.cancel();
        assert!(t.is_cancelled());
        assert!(!t.start());
    }

    #[tokio::test]
    async fn finish_after_finish_keeps_first_outcome() {
        let t = TaskTracker::new();
        t.finish(TaskState::Failed);
        t.finish(TaskState::Success);
        assert_eq!(t.state(), TaskState::Failed);
    }
}
