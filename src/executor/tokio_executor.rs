use tokio::runtime::Handle;

use super::{ExecutorError, Task, TaskExecutor};

/// Submits tasks to a tokio runtime's blocking pool.
///
/// Handlers are synchronous, so they run under `spawn_blocking` and never
/// stall the runtime's async workers.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self, ExecutorError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))
    }
}

impl TaskExecutor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn current_fails_outside_a_runtime() {
        assert!(matches!(TokioExecutor::current(), Err(ExecutorError::Unavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_tasks_on_the_blocking_pool() {
        let executor = TokioExecutor::current().unwrap();
        let (tx, rx) = mpsc::channel();
        executor
            .execute(Box::new(move || {
                tx.send(std::thread::current().name().map(str::to_string)).unwrap();
            }))
            .unwrap();

        let name = tokio::task::spawn_blocking(move || rx.recv().unwrap())
            .await
            .unwrap();
        assert!(name.is_some());
    }
}
