//! Fixed-size worker pool for the asynchronous command bus.

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::panic_message;

use super::{ExecutorError, ExecutorService, Task, TaskExecutor};

/// Pool settings, loadable from configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Prefix for worker thread names; workers are named `{prefix}-{n}`.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name: "dispatch-worker".to_string(),
        }
    }
}

/// Statistics from the pool's workers, returned by
/// [`ThreadPoolExecutor::await_termination`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub tasks_completed: usize,
    pub tasks_panicked: usize,
}

/// Fixed set of worker threads sharing one task queue.
///
/// With one worker, tasks run in submission order. With more, there is no
/// ordering between tasks. A panicking task is logged and the worker moves on.
///
/// ## Example
///
/// ```ignore
/// let pool = ThreadPoolExecutor::builder().workers(4).build()?;
/// pool.execute(Box::new(|| println!("hello from the pool")))?;
///
/// pool.shutdown();
/// let stats = pool.await_termination();
/// ```
pub struct ThreadPoolExecutor {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<PoolStats>>>,
    shut_down: AtomicBool,
    config: PoolConfig,
}

impl ThreadPoolExecutor {
    pub fn builder() -> ThreadPoolExecutorBuilder {
        ThreadPoolExecutorBuilder::default()
    }

    /// Start a pool with `workers` threads and default naming.
    pub fn new(workers: usize) -> Result<Self, ExecutorError> {
        Self::builder().workers(workers).build()
    }

    pub fn from_config(config: PoolConfig) -> Result<Self, ExecutorError> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Shut down, wait for queued tasks to finish, and join every worker.
    ///
    /// Must not be called from one of the pool's own workers.
    pub fn await_termination(&self) -> PoolStats {
        self.shutdown();
        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .fold(PoolStats::default(), |mut total, stats| {
                total.tasks_completed += stats.tasks_completed;
                total.tasks_panicked += stats.tasks_panicked;
                total
            })
    }

    fn spawn(config: PoolConfig) -> Result<Self, ExecutorError> {
        if config.workers == 0 {
            return Err(ExecutorError::Unavailable(
                "worker count must be at least 1".to_string(),
            ));
        }

        let (sender, receiver) = channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let pool = Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(config.workers)),
            shut_down: AtomicBool::new(false),
            config,
        };

        for n in 0..pool.config.workers {
            let name = format!("{}-{}", pool.config.thread_name, n);
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || work(&name, receiver))
                .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
            pool.workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }

        debug!(workers = pool.config.workers, name = %pool.config.thread_name, "thread pool started");
        Ok(pool)
    }
}

fn work(name: &str, receiver: Arc<Mutex<Receiver<Task>>>) -> PoolStats {
    let mut stats = PoolStats::default();

    loop {
        let next = match receiver.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };

        // Disconnected: the pool shut down and the queue is drained.
        let Ok(task) = next else { break };

        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => stats.tasks_completed += 1,
            Err(payload) => {
                stats.tasks_panicked += 1;
                error!(worker = %name, panic = %panic_message(payload.as_ref()), "task panicked");
            }
        }
    }

    stats
}

impl TaskExecutor for ThreadPoolExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ExecutorError::Shutdown);
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| ExecutorError::Shutdown),
            None => Err(ExecutorError::Shutdown),
        }
    }
}

impl ExecutorService for ThreadPoolExecutor {
    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(name = %self.config.thread_name, "thread pool shutting down");
    }

    fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("config", &self.config)
            .field("shut_down", &self.is_shutdown())
            .finish()
    }
}

/// Builder for [`ThreadPoolExecutor`].
#[derive(Debug, Clone, Default)]
pub struct ThreadPoolExecutorBuilder {
    config: PoolConfig,
}

impl ThreadPoolExecutorBuilder {
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ThreadPoolExecutor, ExecutorError> {
        ThreadPoolExecutor::spawn(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_submitted_tasks() {
        let pool = ThreadPoolExecutor::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        let stats = pool.await_termination();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(stats.tasks_completed, 10);
    }

    #[test]
    fn single_worker_preserves_submission_order() {
        let pool = ThreadPoolExecutor::new(1).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let seen = Arc::clone(&seen);
            pool.execute(Box::new(move || seen.lock().unwrap().push(i))).unwrap();
        }

        pool.await_termination();
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_after_shutdown() {
        let pool = ThreadPoolExecutor::new(1).unwrap();
        pool.shutdown();
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert_eq!(pool.execute(Box::new(|| {})), Err(ExecutorError::Shutdown));
    }

    #[test]
    fn worker_survives_panicking_task() {
        let pool = ThreadPoolExecutor::new(1).unwrap();
        pool.execute(Box::new(|| panic!("task failure"))).unwrap();
        pool.execute(Box::new(|| {})).unwrap();

        let stats = pool.await_termination();
        assert_eq!(stats, PoolStats { tasks_completed: 1, tasks_panicked: 1 });
    }

    #[test]
    fn zero_workers_is_a_configuration_error() {
        assert!(matches!(
            ThreadPoolExecutor::new(0),
            Err(ExecutorError::Unavailable(_))
        ));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{ "workers": 3 }"#).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.thread_name, "dispatch-worker");

        let pool = ThreadPoolExecutor::from_config(config).unwrap();
        assert_eq!(pool.config().workers, 3);
    }
}
