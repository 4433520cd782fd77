//! Error types for command handlers and dispatch.

use std::any::Any;
use std::error::Error;

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::unit_of_work::UnitOfWorkError;

/// Error type for handler, interceptor and hook operations.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload decode / deserialization failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// Business logic rejected the command (validation, invariant violation).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Aggregate or resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The handler panicked. The panic was contained and turned into a result.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// Other error.
    #[error("handler error: {0}")]
    Other(#[source] Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap any error as `HandlerError::Other`.
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        HandlerError::Panicked(panic_message(payload.as_ref()))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

impl From<bitcode::Error> for HandlerError {
    fn from(err: bitcode::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

/// Lets handlers use `?` on hook registration and nested units of work.
impl From<UnitOfWorkError> for HandlerError {
    fn from(err: UnitOfWorkError) -> Self {
        match err {
            UnitOfWorkError::Handler(err) => err,
            other => HandlerError::Other(Box::new(other)),
        }
    }
}

/// The exceptional cause carried by a [`CommandResult`](crate::CommandResult).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is subscribed under the command's name.
    #[error("no handler registered for command: {command}")]
    NoHandler { command: String },
    /// A dispatch interceptor refused the command before it reached the bus.
    #[error("dispatch interceptor rejected command: {0}")]
    InterceptorRejected(#[source] HandlerError),
    /// The handler (or a handler interceptor) failed.
    #[error(transparent)]
    Handler(HandlerError),
    /// The unit of work failed outside the handler, e.g. a commit hook.
    #[error(transparent)]
    UnitOfWork(UnitOfWorkError),
    /// The bus was shut down before the command was accepted.
    #[error("command bus is shut down")]
    BusShutdown,
    /// The executor refused the execution unit.
    #[error("executor rejected command: {0}")]
    ExecutorRejected(#[from] ExecutorError),
    /// The executor dropped the execution unit without running it.
    #[error("command result was lost before it could be delivered")]
    ResultLost,
}

/// Discriminant of a [`DispatchError`], for callers that only care about
/// which kind of failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchErrorKind {
    NoHandler,
    InterceptorRejected,
    Handler,
    UnitOfWork,
    BusShutdown,
    ExecutorRejected,
    ResultLost,
}

impl DispatchError {
    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            DispatchError::NoHandler { .. } => DispatchErrorKind::NoHandler,
            DispatchError::InterceptorRejected(_) => DispatchErrorKind::InterceptorRejected,
            DispatchError::Handler(_) => DispatchErrorKind::Handler,
            DispatchError::UnitOfWork(_) => DispatchErrorKind::UnitOfWork,
            DispatchError::BusShutdown => DispatchErrorKind::BusShutdown,
            DispatchError::ExecutorRejected(_) => DispatchErrorKind::ExecutorRejected,
            DispatchError::ResultLost => DispatchErrorKind::ResultLost,
        }
    }

    /// The handler error behind this failure, if there is one.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            DispatchError::Handler(err) | DispatchError::InterceptorRejected(err) => Some(err),
            DispatchError::UnitOfWork(UnitOfWorkError::Commit(err)) => Some(err),
            _ => None,
        }
    }
}

impl From<UnitOfWorkError> for DispatchError {
    fn from(err: UnitOfWorkError) -> Self {
        match err {
            UnitOfWorkError::Handler(err) => DispatchError::Handler(err),
            other => DispatchError::UnitOfWork(other),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_failure_maps_to_handler_kind() {
        let err: DispatchError =
            UnitOfWorkError::Handler(HandlerError::Rejected("nope".into())).into();
        assert_eq!(err.kind(), DispatchErrorKind::Handler);
        assert!(matches!(err.handler_error(), Some(HandlerError::Rejected(s)) if s == "nope"));
    }

    #[test]
    fn commit_failure_maps_to_unit_of_work_kind() {
        let err: DispatchError =
            UnitOfWorkError::Commit(HandlerError::Rejected("tx".into())).into();
        assert_eq!(err.kind(), DispatchErrorKind::UnitOfWork);
        assert!(err.handler_error().is_some());
    }

    #[test]
    fn decode_errors_convert() {
        let err: HandlerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, HandlerError::DecodeFailed(_)));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert!(matches!(HandlerError::from_panic(caught), HandlerError::Panicked(s) if s == "boom"));
    }
}
