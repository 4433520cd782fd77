use tracing::{debug, warn};

use crate::message::{CommandResult, Message};

/// Receives the result of a dispatched command. Invoked exactly once.
pub trait CommandCallback: Send {
    fn on_result(self: Box<Self>, command: &Message, result: CommandResult);
}

impl<F> CommandCallback for F
where
    F: FnOnce(&Message, CommandResult) + Send,
{
    fn on_result(self: Box<Self>, command: &Message, result: CommandResult) {
        (*self)(command, result)
    }
}

/// Discards the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl CommandCallback for NoOpCallback {
    fn on_result(self: Box<Self>, _command: &Message, _result: CommandResult) {}
}

/// Logs failed commands at `warn` and successful ones at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCallback;

impl CommandCallback for LoggingCallback {
    fn on_result(self: Box<Self>, command: &Message, result: CommandResult) {
        match result.exception() {
            Some(cause) => warn!(
                message_id = %command.id(),
                command = %command.name(),
                error = %cause,
                "command failed"
            ),
            None => debug!(message_id = %command.id(), command = %command.name(), "command succeeded"),
        }
    }
}
