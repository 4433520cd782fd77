//! Task executors used by the asynchronous command bus and the deadline manager.
//!
//! A [`TaskExecutor`] only accepts work. An [`ExecutorService`] can also be
//! shut down; the bus calls [`ExecutorService::shutdown`] when it is itself
//! shut down.

mod error;
mod inline;
mod thread_pool;
#[cfg(feature = "tokio")]
mod tokio_executor;

pub use error::ExecutorError;
pub use inline::InlineExecutor;
pub use thread_pool::{PoolConfig, PoolStats, ThreadPoolExecutor, ThreadPoolExecutorBuilder};
#[cfg(feature = "tokio")]
pub use tokio_executor::TokioExecutor;

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts tasks for execution.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: Task) -> Result<(), ExecutorError>;
}

/// A [`TaskExecutor`] with a lifecycle.
pub trait ExecutorService: TaskExecutor {
    /// Stop accepting tasks. Work already accepted still runs.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}
