//! The transactional scope around one message.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::message::Message;

use super::error::UnitOfWorkError;
use super::phase::Phase;
use super::resources::Resources;

type Hook = Box<dyn FnOnce(&mut UnitOfWork) -> Result<(), HandlerError> + Send>;

#[derive(Default)]
struct Hooks {
    prepare_commit: VecDeque<Hook>,
    commit: VecDeque<Hook>,
    rollback: VecDeque<Hook>,
    after_commit: VecDeque<Hook>,
    cleanup: VecDeque<Hook>,
}

impl Hooks {
    fn queue(&mut self, phase: Phase) -> Option<&mut VecDeque<Hook>> {
        match phase {
            Phase::PrepareCommit => Some(&mut self.prepare_commit),
            Phase::Commit => Some(&mut self.commit),
            Phase::Rollback => Some(&mut self.rollback),
            Phase::AfterCommit => Some(&mut self.after_commit),
            Phase::Cleanup => Some(&mut self.cleanup),
            _ => None,
        }
    }

    fn next(&mut self, phase: Phase) -> Option<Hook> {
        let queue = self.queue(phase)?;
        if phase.is_reverse_callback_order() {
            queue.pop_back()
        } else {
            queue.pop_front()
        }
    }

    fn clear(&mut self) {
        *self = Hooks::default();
    }
}

/// Transactional scope around the processing of one message.
///
/// A unit of work is created right before a handler runs and closed right
/// after it commits or rolls back. It is never reused. The lifecycle is:
///
/// ```text
/// start ─► task ─┬─ Ok ─► PREPARE_COMMIT ─► COMMIT ─► AFTER_COMMIT ─► CLEANUP ─► CLOSED
///                │                │            │
///                └─ Err ──────────┴────────────┴─► ROLLBACK ─► CLEANUP ─► CLOSED
/// ```
///
/// There is no thread-local "current" unit of work. The active instance is
/// passed explicitly to handlers, interceptors and hooks, and nesting goes
/// through [`execute_nested`](UnitOfWork::execute_nested).
///
/// ## Example
///
/// ```ignore
/// let mut uow = UnitOfWork::start(message);
/// let result = uow.execute_with_result(|uow| {
///     uow.on_commit(|_| { store.flush()?; Ok(()) })?;
///     uow.on_rollback(|_| { store.discard(); Ok(()) })?;
///     Ok(serde_json::Value::Null)
/// });
/// assert_eq!(uow.phase(), Phase::Closed);
/// ```
pub struct UnitOfWork {
    message: Message,
    phase: Phase,
    parent_id: Option<String>,
    depth: usize,
    resources: Resources,
    hooks: Hooks,
    nested: Vec<UnitOfWork>,
    rollback_cause: Option<String>,
}

impl UnitOfWork {
    /// Begin a root unit of work for `message`.
    pub fn start(message: Message) -> Self {
        debug!(message_id = %message.id(), message = %message.name(), "starting unit of work");
        Self {
            message,
            phase: Phase::Started,
            parent_id: None,
            depth: 0,
            resources: Resources::new(),
            hooks: Hooks::default(),
            nested: Vec::new(),
            rollback_cause: None,
        }
    }

    /// The message being processed.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Take back the message once the unit of work is done with it.
    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_started()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Identifier of the parent's message, for a nested unit of work.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Nesting depth; 0 for a root unit of work.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Why the unit of work rolled back, once it has.
    pub fn rollback_cause(&self) -> Option<&str> {
        self.rollback_cause.as_deref()
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    pub fn on_prepare_commit<F>(&mut self, hook: F) -> Result<(), UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<(), HandlerError> + Send + 'static,
    {
        self.add_hook(Phase::PrepareCommit, Box::new(hook))
    }

    pub fn on_commit<F>(&mut self, hook: F) -> Result<(), UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<(), HandlerError> + Send + 'static,
    {
        self.add_hook(Phase::Commit, Box::new(hook))
    }

    /// Register work to run once the commit has fully succeeded.
    ///
    /// For a nested unit of work this only runs after the root commits.
    pub fn on_after_commit<F>(&mut self, hook: F) -> Result<(), UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<(), HandlerError> + Send + 'static,
    {
        self.add_hook(Phase::AfterCommit, Box::new(hook))
    }

    /// Register compensation work. Rollback hooks run in reverse registration order.
    pub fn on_rollback<F>(&mut self, hook: F) -> Result<(), UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<(), HandlerError> + Send + 'static,
    {
        self.add_hook(Phase::Rollback, Box::new(hook))
    }

    pub fn on_cleanup<F>(&mut self, hook: F) -> Result<(), UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<(), HandlerError> + Send + 'static,
    {
        self.add_hook(Phase::Cleanup, Box::new(hook))
    }

    fn add_hook(&mut self, phase: Phase, hook: Hook) -> Result<(), UnitOfWorkError> {
        if self.phase == Phase::Closed {
            return Err(UnitOfWorkError::Closed);
        }
        if phase < self.phase {
            return Err(UnitOfWorkError::PhasePassed {
                requested: phase,
                current: self.phase,
            });
        }
        if let Some(queue) = self.hooks.queue(phase) {
            queue.push_back(hook);
        }
        Ok(())
    }

    /// Run `task` inside this unit of work and drive it to completion.
    ///
    /// On success the commit phases run and the task's value is returned. If
    /// the task (or a PREPARE_COMMIT / COMMIT hook) fails, rollback hooks run
    /// and the failure becomes the result. A panicking task is treated as a
    /// failure. A root unit of work is closed when this returns; a nested one
    /// hands its remaining phases to its parent.
    pub fn execute_with_result<F>(&mut self, task: F) -> Result<Value, UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<Value, HandlerError>,
    {
        match self.phase {
            Phase::Started => {}
            Phase::Closed => return Err(UnitOfWorkError::Closed),
            other => return Err(UnitOfWorkError::IllegalState(other)),
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(self)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)));

        match outcome {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                debug!(message_id = %self.message.id(), error = %err, "task failed, rolling back");
                self.rollback(err.to_string());
                if self.is_root() {
                    self.cleanup();
                }
                Err(UnitOfWorkError::Handler(err))
            }
        }
    }

    /// Run `task` in a child unit of work for `message`.
    ///
    /// The child runs its own PREPARE_COMMIT and COMMIT phases immediately.
    /// Its AFTER_COMMIT and CLEANUP work waits for this unit of work, and if
    /// this unit of work later rolls back, the child's rollback hooks run
    /// too, even though the child already committed.
    pub fn execute_nested<F>(&mut self, message: Message, task: F) -> Result<Value, UnitOfWorkError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<Value, HandlerError>,
    {
        if self.phase != Phase::Started {
            return Err(match self.phase {
                Phase::Closed => UnitOfWorkError::Closed,
                other => UnitOfWorkError::IllegalState(other),
            });
        }

        let mut child = UnitOfWork::start(message);
        child.parent_id = Some(self.message.id().to_string());
        child.depth = self.depth + 1;

        let result = child.execute_with_result(task);
        self.nested.push(child);
        result
    }

    fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        let committed = self
            .run_phase(Phase::PrepareCommit)
            .and_then(|()| self.run_phase(Phase::Commit));

        if let Err(err) = committed {
            warn!(message_id = %self.message.id(), error = %err, "commit failed, rolling back");
            self.rollback(err.to_string());
            if self.is_root() {
                self.cleanup();
            }
            return Err(UnitOfWorkError::Commit(err));
        }

        if self.is_root() {
            self.after_commit();
            self.cleanup();
        }
        Ok(())
    }

    fn after_commit(&mut self) {
        for child in self.nested.iter_mut().rev() {
            if child.phase == Phase::Commit {
                child.after_commit();
            }
        }
        self.run_phase_logged(Phase::AfterCommit);
    }

    fn rollback(&mut self, cause: String) {
        for child in self.nested.iter_mut().rev() {
            if child.phase == Phase::Commit {
                child.rollback(cause.clone());
            }
        }
        self.rollback_cause = Some(cause);
        self.run_phase_logged(Phase::Rollback);
    }

    fn cleanup(&mut self) {
        for child in self.nested.iter_mut().rev() {
            child.cleanup();
        }
        self.run_phase_logged(Phase::Cleanup);
        self.resources.clear();
        self.hooks.clear();
        self.phase = Phase::Closed;
        debug!(message_id = %self.message.id(), "unit of work closed");
    }

    /// Run every hook of `phase`, stopping at the first failure. A panicking
    /// hook counts as a failure.
    fn run_phase(&mut self, phase: Phase) -> Result<(), HandlerError> {
        self.phase = phase;
        while let Some(hook) = self.hooks.next(phase) {
            panic::catch_unwind(AssertUnwindSafe(|| hook(self)))
                .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)))?;
        }
        Ok(())
    }

    /// Run every hook of `phase`; failures are logged and do not stop the phase.
    fn run_phase_logged(&mut self, phase: Phase) {
        self.phase = phase;
        while let Some(hook) = self.hooks.next(phase) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(self)))
                .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)));
            if let Err(err) = outcome {
                warn!(
                    message_id = %self.message.id(),
                    phase = %phase,
                    error = %err,
                    "unit of work hook failed"
                );
            }
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("message_id", &self.message.id())
            .field("message", &self.message.name())
            .field("phase", &self.phase)
            .field("depth", &self.depth)
            .field("resources", &self.resources)
            .field("nested", &self.nested.len())
            .finish()
    }
}
