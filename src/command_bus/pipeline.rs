//! Dispatch steps shared by both bus variants.

use std::sync::Arc;

use tracing::debug;

use crate::error::DispatchError;
use crate::handler::list::CopyOnWriteList;
use crate::handler::{EnhancerRegistry, HandlerRegistry, MessageHandler, Registration};
use crate::interceptor::{dispatch, DispatchInterceptor, HandlerInterceptor, InterceptorChain};
use crate::message::{CommandResult, Message};
use crate::unit_of_work::UnitOfWork;

#[derive(Clone, Default)]
pub(crate) struct Pipeline {
    handlers: HandlerRegistry,
    enhancers: EnhancerRegistry,
    dispatch_interceptors: CopyOnWriteList<dyn DispatchInterceptor>,
    handler_interceptors: CopyOnWriteList<dyn HandlerInterceptor>,
}

/// Outcome of the caller-thread part of a dispatch.
pub(crate) enum Prepared {
    /// A handler was found; the execution unit is ready to run.
    Ready(Execution),
    /// Dispatch ended early (interceptor rejection or no handler).
    Done(Message, CommandResult),
}

/// Everything needed to handle one command: the message, the handler captured
/// at dispatch time and the handler interceptors in effect at that moment.
pub(crate) struct Execution {
    message: Message,
    handler: Arc<dyn MessageHandler>,
    interceptors: Arc<Vec<Arc<dyn HandlerInterceptor>>>,
}

impl Execution {
    /// Run the interceptor chain and handler inside a fresh unit of work.
    pub(crate) fn run(self) -> (Message, CommandResult) {
        let correlation_id = self.message.id().to_string();
        let chain = InterceptorChain::new(self.interceptors, self.handler);

        let mut uow = UnitOfWork::start(self.message);
        let result = match uow.execute_with_result(|uow| chain.proceed(uow)) {
            Ok(value) => CommandResult::success(correlation_id, value),
            Err(err) => CommandResult::exceptional(correlation_id, err.into()),
        };
        (uow.into_message(), result)
    }

    pub(crate) fn into_message(self) -> Message {
        self.message
    }
}

impl Pipeline {
    pub(crate) fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub(crate) fn enhancers(&self) -> &EnhancerRegistry {
        &self.enhancers
    }

    pub(crate) fn set_enhancers(&mut self, enhancers: EnhancerRegistry) {
        self.enhancers = enhancers;
    }

    pub(crate) fn subscribe(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Registration {
        let handler = self.enhancers.wrap_handler(command, handler);
        self.handlers.subscribe(command, handler)
    }

    pub(crate) fn register_dispatch_interceptor(
        &self,
        interceptor: Arc<dyn DispatchInterceptor>,
    ) -> Registration {
        self.dispatch_interceptors.push(interceptor)
    }

    pub(crate) fn register_handler_interceptor(
        &self,
        interceptor: Arc<dyn HandlerInterceptor>,
    ) -> Registration {
        self.handler_interceptors.push(interceptor)
    }

    /// Apply dispatch interceptors and resolve the handler.
    pub(crate) fn prepare(&self, command: Message) -> Prepared {
        let interceptors = self.dispatch_interceptors.snapshot();
        let message = if interceptors.is_empty() {
            command
        } else {
            match dispatch::apply(&interceptors, command.clone()) {
                Ok(message) => message,
                Err(err) => {
                    debug!(message_id = %command.id(), command = %command.name(), error = %err, "dispatch interceptor rejected command");
                    let result = CommandResult::exceptional(
                        command.id(),
                        DispatchError::InterceptorRejected(err),
                    );
                    return Prepared::Done(command, result);
                }
            }
        };

        match self.handlers.get(message.name()) {
            Some(handler) => Prepared::Ready(Execution {
                message,
                handler,
                interceptors: self.handler_interceptors.snapshot(),
            }),
            None => {
                debug!(message_id = %message.id(), command = %message.name(), "no handler registered");
                let result = CommandResult::exceptional(
                    message.id(),
                    DispatchError::NoHandler {
                        command: message.name().to_string(),
                    },
                );
                Prepared::Done(message, result)
            }
        }
    }
}
