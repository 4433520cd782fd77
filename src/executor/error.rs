use thiserror::Error;

/// Error type for task submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The executor has been shut down and accepts no more work.
    #[error("executor is shut down")]
    Shutdown,
    /// The executor could not be created or reached.
    #[error("executor unavailable: {0}")]
    Unavailable(String),
    /// The executor refused the task.
    #[error("task rejected: {0}")]
    Rejected(String),
}
