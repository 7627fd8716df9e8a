use observability_deps::tracing::{debug, trace};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A unit of work scheduled through a [`PriorityCommandPool`]: an owned future-producing
/// closure, run once by whichever worker task pulls it off the queue.
pub type Command = Box<dyn (FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send>;

/// The priority every command gets unless it's queued with an explicit class.
pub const DEFAULT_PRIORITY: i32 = 0;

struct PriQueue {
    priority: i32,
    min_running: usize,
    running: AtomicUsize,
    queue: Mutex<VecDeque<Command>>,
}

impl std::fmt::Debug for PriQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriQueue")
            .field("priority", &self.priority)
            .field("min_running", &self.min_running)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("queued", &self.queue.lock().len())
            .finish()
    }
}

impl PriQueue {
    fn new(priority: i32, min_running: usize) -> Self {
        Self {
            priority,
            min_running,
            running: AtomicUsize::new(0),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }

    fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    fn push(&self, cmd: Command) {
        self.queue.lock().push_back(cmd);
    }

    fn pop(&self) -> Option<Command> {
        self.queue.lock().pop_front()
    }
}

/// Multi-class priority scheduler for dispatch work, mirroring the original executor's
/// priority queue: each class keeps a `min_running` floor so interactive, low-chunk-count
/// queries always get a worker even while full-table scans saturate the pool.
///
/// Classes are drained highest priority first; within a scan over classes, any class still
/// under its floor is served before falling back to first-available-in-priority-order.
pub struct PriorityCommandPool {
    queues: Mutex<BTreeMap<i32, Arc<PriQueue>>>,
    notify: Notify,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for PriorityCommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityCommandPool")
            .field("queues", &self.queues.lock())
            .field("shutting_down", &self.shutting_down.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for PriorityCommandPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityCommandPool {
    pub fn new() -> Self {
        let pool = Self {
            queues: Mutex::new(BTreeMap::new()),
            notify: Notify::new(),
            shutting_down: AtomicBool::new(false),
        };
        pool.add_priority_queue(DEFAULT_PRIORITY, 1);
        pool
    }

    /// Register a priority class. Higher `priority` values are drained first. Returns `false`
    /// if the class already exists.
    pub fn add_priority_queue(&self, priority: i32, min_running: usize) -> bool {
        let mut queues = self.queues.lock();
        if queues.contains_key(&priority) {
            return false;
        }
        queues.insert(priority, Arc::new(PriQueue::new(priority, min_running)));
        true
    }

    /// Queue a command at the default priority.
    pub fn queue_cmd(&self, cmd: Command) {
        self.queue_cmd_with_priority(cmd, DEFAULT_PRIORITY);
    }

    /// Queue a command at `priority`, falling back to the default class if unregistered.
    pub fn queue_cmd_with_priority(&self, cmd: Command, priority: i32) {
        {
            let queues = self.queues.lock();
            let target = queues
                .get(&priority)
                .or_else(|| queues.get(&DEFAULT_PRIORITY))
                .expect("default priority queue always registered");
            target.push(cmd);
            trace!(priority, "queued dispatch command");
        }
        self.notify.notify_one();
    }

    /// Pull the next command to run, preferring classes still under their `min_running` floor,
    /// then falling back to highest-priority-first across all non-empty classes. Blocks until
    /// one is available, unless the pool is shutting down and everything is empty.
    pub async fn get_cmd(&self) -> Option<Command> {
        loop {
            if let Some(cmd) = self.try_get_cmd() {
                return Some(cmd);
            }
            if self.shutting_down.load(Ordering::SeqCst) && self.is_empty() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn try_get_cmd(&self) -> Option<Command> {
        let queues: Vec<_> = self.queues.lock().values().cloned().collect();
        let shutting_down = self.shutting_down.load(Ordering::SeqCst);

        if !shutting_down {
            for q in queues.iter().rev() {
                if q.running() < q.min_running {
                    if let Some(cmd) = q.pop() {
                        return Some(cmd);
                    }
                }
            }
        }
        for q in queues.iter().rev() {
            if let Some(cmd) = q.pop() {
                return Some(cmd);
            }
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.queues.lock().values().all(|q| q.len() == 0)
    }

    pub fn command_start(&self, priority: i32) {
        if let Some(q) = self.queues.lock().get(&priority) {
            q.running.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn command_finish(&self, priority: i32) {
        if let Some(q) = self.queues.lock().get(&priority) {
            q.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn prepare_shutdown(&self) {
        debug!("priority command pool shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn stats_str(&self) -> String {
        let queues = self.queues.lock();
        let mut out = String::new();
        for q in queues.values() {
            out.push_str(&format!(
                "(pri={}:sz={}:r={})",
                q.priority,
                q.len(),
                q.running()
            ));
        }
        out
    }
}

/// Run `cmd` to completion while keeping `pool`'s running count for `priority` accurate.
pub async fn run_tracked(pool: &PriorityCommandPool, priority: i32, cmd: Command) {
    pool.command_start(priority);
    cmd().await;
    pool.command_finish(priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;

    fn noop_command(counter: Arc<Counter>) -> Command {
        Box::new(move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn default_queue_runs_commands_fifo() {
        let pool = PriorityCommandPool::new();
        let counter = Arc::new(Counter::new(0));
        pool.queue_cmd(noop_command(counter.clone()));
        pool.queue_cmd(noop_command(counter.clone()));
        let c1 = pool.get_cmd().await.unwrap();
        c1().await;
        let c2 = pool.get_cmd().await.unwrap();
        c2().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn higher_priority_class_served_first_once_floors_met() {
        let pool = PriorityCommandPool::new();
        pool.add_priority_queue(10, 0);
        let counter = Arc::new(Counter::new(0));
        pool.queue_cmd(noop_command(counter.clone()));
        pool.queue_cmd_with_priority(noop_command(counter.clone()), 10);
        let cmd = pool.get_cmd().await.unwrap();
        // the high priority class (10) is scanned first since classes are drained highest-first
        cmd().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_then_returns_none() {
        let pool = PriorityCommandPool::new();
        pool.prepare_shutdown();
        assert!(pool.get_cmd().await.is_none());
    }

    #[test]
    fn stats_str_reports_queue_sizes() {
        let pool = PriorityCommandPool::new();
        pool.queue_cmd(Box::new(|| Box::pin(async {})));
        let stats = pool.stats_str();
        assert!(stats.contains("sz=1"));
    }
}
