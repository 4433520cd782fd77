use std::fmt;

/// Lifecycle phase of a [`UnitOfWork`](super::UnitOfWork).
///
/// Phases are ordered; a unit of work only moves forward. ROLLBACK sits
/// before AFTER_COMMIT so that once a commit has completed, rollback work
/// can no longer be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Started,
    PrepareCommit,
    Commit,
    Rollback,
    AfterCommit,
    Cleanup,
    Closed,
}

impl Phase {
    /// Whether the unit of work is between start and close.
    pub fn is_started(self) -> bool {
        self != Phase::Closed
    }

    /// Hooks for these phases run last-registered first.
    pub fn is_reverse_callback_order(self) -> bool {
        matches!(self, Phase::Rollback | Phase::AfterCommit | Phase::Cleanup)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Started => "STARTED",
            Phase::PrepareCommit => "PREPARE_COMMIT",
            Phase::Commit => "COMMIT",
            Phase::Rollback => "ROLLBACK",
            Phase::AfterCommit => "AFTER_COMMIT",
            Phase::Cleanup => "CLEANUP",
            Phase::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
