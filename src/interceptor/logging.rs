use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::HandlerError;
use crate::message::Message;
use crate::unit_of_work::UnitOfWork;

use super::{DispatchInterceptor, HandlerInterceptor, InterceptorChain};

/// Logs every dispatched message and the outcome of every handler call.
///
/// Register it as both a dispatch and a handler interceptor to see the full
/// life of a command.
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    target: String,
}

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self::named("command")
    }

    /// Tag log records with `name` instead of the default.
    pub fn named(name: impl Into<String>) -> Self {
        Self { target: name.into() }
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchInterceptor for LoggingInterceptor {
    fn handle(&self, message: Message) -> Result<Message, HandlerError> {
        info!(
            logger = %self.target,
            message_id = %message.id(),
            command = %message.name(),
            "dispatched"
        );
        Ok(message)
    }
}

impl HandlerInterceptor for LoggingInterceptor {
    fn handle(&self, uow: &mut UnitOfWork, chain: InterceptorChain) -> Result<Value, HandlerError> {
        let message_id = uow.message().id().to_string();
        let command = uow.message().name().to_string();
        debug!(logger = %self.target, message_id = %message_id, command = %command, "handling");

        let result = chain.proceed(uow);
        match &result {
            Ok(value) => info!(
                logger = %self.target,
                message_id = %message_id,
                command = %command,
                result = %value,
                "handled"
            ),
            Err(err) => warn!(
                logger = %self.target,
                message_id = %message_id,
                command = %command,
                error = %err,
                "handler failed"
            ),
        }
        result
    }
}
