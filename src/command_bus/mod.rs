//! Command buses: route each command to exactly one handler.
//!
//! Two variants share the same dispatch pipeline:
//!
//! - [`SimpleCommandBus`] handles commands on the dispatching thread.
//! - [`AsyncCommandBus`] submits each command's unit of work to an executor.
//!
//! Every accepted dispatch ends with exactly one callback invocation. A
//! missing handler, a rejecting interceptor and a failing handler all arrive
//! as exceptional results; `dispatch` itself never fails.

mod asynchronous;
mod callback;
mod pipeline;
mod simple;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DispatchError, HandlerError};
use crate::handler::{MessageHandler, Registration};
use crate::interceptor::{DispatchInterceptor, HandlerInterceptor};
use crate::message::{Command, CommandResult, Message};
use crate::unit_of_work::UnitOfWork;

pub use asynchronous::{AsyncCommandBus, AsyncCommandBusBuilder};
pub use callback::{CommandCallback, LoggingCallback, NoOpCallback};
pub use simple::{SimpleCommandBus, SimpleCommandBusBuilder};

/// Routes commands to their handlers.
pub trait CommandBus: Send + Sync {
    /// Dispatch `command`; `callback` receives its result exactly once.
    fn dispatch(&self, command: Message, callback: Box<dyn CommandCallback>);

    /// Register `handler` for `command`, replacing any existing handler.
    fn subscribe(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Registration;

    fn register_dispatch_interceptor(&self, interceptor: Arc<dyn DispatchInterceptor>) -> Registration;

    fn register_handler_interceptor(&self, interceptor: Arc<dyn HandlerInterceptor>) -> Registration;

    /// Dispatch and block until the result arrives.
    fn dispatch_and_wait(&self, command: Message) -> CommandResult {
        let correlation_id = command.id().to_string();
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            command,
            Box::new(move |_: &Message, result: CommandResult| {
                let _ = tx.send(result);
            }),
        );
        rx.recv()
            .unwrap_or_else(|_| CommandResult::exceptional(correlation_id, DispatchError::ResultLost))
    }

    /// Dispatch and wait up to `timeout`. Returns `None` if the result did
    /// not arrive in time; the command keeps running.
    fn dispatch_and_wait_timeout(&self, command: Message, timeout: Duration) -> Option<CommandResult> {
        let correlation_id = command.id().to_string();
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            command,
            Box::new(move |_: &Message, result: CommandResult| {
                let _ = tx.send(result);
            }),
        );
        match rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(CommandResult::exceptional(
                correlation_id,
                DispatchError::ResultLost,
            )),
        }
    }

    /// Subscribe a handler for a typed command, decoded from the message's
    /// bitcode payload.
    fn subscribe_command<C, F>(&self, handler: F) -> Registration
    where
        Self: Sized,
        C: Command + DeserializeOwned + 'static,
        F: Fn(C, &mut UnitOfWork) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(
            C::NAME,
            Arc::new(move |uow: &mut UnitOfWork| -> Result<Value, HandlerError> {
                let command: C = uow.message().decode()?;
                handler(command, uow)
            }),
        )
    }
}
