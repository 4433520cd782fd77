use thiserror::Error;

use crate::error::HandlerError;
use crate::unit_of_work::UnitOfWorkError;

/// Error type for timer services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timer service not started")]
    NotStarted,
    #[error("timer service already started")]
    AlreadyStarted,
    /// The timer could not acquire its scheduling resources.
    #[error("timer service unavailable: {0}")]
    Unavailable(String),
    #[error("failed to persist deadline: {0}")]
    Persist(String),
    #[error("timer service stopped")]
    Stopped,
}

/// Error type for deadline management.
#[derive(Debug, Error)]
pub enum DeadlineError {
    /// The deadline manager could not be set up. Raised at construction time.
    #[error("deadline manager configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Timer(#[from] TimerError),
    /// A dispatch interceptor rejected the deadline message.
    #[error("deadline message rejected: {0}")]
    Rejected(#[source] HandlerError),
    #[error("invalid trigger time: {0}")]
    InvalidTrigger(String),
    #[error("failed to encode deadline: {0}")]
    Encoding(String),
    /// The unit of work no longer accepts deferred scheduling.
    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),
}

impl From<serde_json::Error> for DeadlineError {
    fn from(err: serde_json::Error) -> Self {
        DeadlineError::Encoding(err.to_string())
    }
}
