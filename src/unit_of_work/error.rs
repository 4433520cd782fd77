use thiserror::Error;

use crate::error::HandlerError;

use super::Phase;

/// Error type for unit of work operations.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// The task run inside the unit of work failed. The unit of work rolled back.
    #[error(transparent)]
    Handler(HandlerError),
    /// A PREPARE_COMMIT or COMMIT hook failed. The unit of work rolled back.
    #[error("commit failed: {0}")]
    Commit(#[source] HandlerError),
    /// The unit of work is already closed.
    #[error("unit of work is closed")]
    Closed,
    /// A hook was registered for a phase the unit of work has already left.
    #[error("cannot register a {requested} handler: unit of work is already in {current}")]
    PhasePassed { requested: Phase, current: Phase },
    /// The operation is not allowed in the current phase.
    #[error("operation not allowed in phase {0}")]
    IllegalState(Phase),
}
