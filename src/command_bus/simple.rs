use std::fmt;
use std::sync::Arc;

use crate::handler::{EnhancerRegistry, HandlerEnhancer, HandlerRegistry, MessageHandler, Registration};
use crate::interceptor::{DispatchInterceptor, HandlerInterceptor};
use crate::message::Message;

use super::pipeline::{Pipeline, Prepared};
use super::{CommandBus, CommandCallback};

/// Command bus that handles every command on the dispatching thread.
///
/// `dispatch` returns once the handler, the unit of work and the callback
/// have all completed.
///
/// ## Example
///
/// ```ignore
/// use sourced_dispatch::{CommandBus, Message, SimpleCommandBus, UnitOfWork};
///
/// let bus = SimpleCommandBus::new();
/// bus.subscribe("ping", Arc::new(|_: &mut UnitOfWork| Ok(serde_json::json!("pong"))));
///
/// let result = bus.dispatch_and_wait(Message::with_string_payload("ping", ""));
/// assert_eq!(result.payload(), Some(&serde_json::json!("pong")));
/// ```
#[derive(Clone, Default)]
pub struct SimpleCommandBus {
    pipeline: Pipeline,
}

impl SimpleCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SimpleCommandBusBuilder {
        SimpleCommandBusBuilder::default()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        self.pipeline.handlers()
    }

    /// Enhancers applied to handlers subscribed from now on.
    pub fn register_enhancer(&self, enhancer: Arc<dyn HandlerEnhancer>) -> Registration {
        self.pipeline.enhancers().register_enhancer(enhancer)
    }
}

impl CommandBus for SimpleCommandBus {
    fn dispatch(&self, command: Message, callback: Box<dyn CommandCallback>) {
        match self.pipeline.prepare(command) {
            Prepared::Done(message, result) => callback.on_result(&message, result),
            Prepared::Ready(execution) => {
                let (message, result) = execution.run();
                callback.on_result(&message, result);
            }
        }
    }

    fn subscribe(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Registration {
        self.pipeline.subscribe(command, handler)
    }

    fn register_dispatch_interceptor(&self, interceptor: Arc<dyn DispatchInterceptor>) -> Registration {
        self.pipeline.register_dispatch_interceptor(interceptor)
    }

    fn register_handler_interceptor(&self, interceptor: Arc<dyn HandlerInterceptor>) -> Registration {
        self.pipeline.register_handler_interceptor(interceptor)
    }
}

impl fmt::Debug for SimpleCommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleCommandBus")
            .field("handlers", self.pipeline.handlers())
            .finish()
    }
}

/// Builder for [`SimpleCommandBus`].
///
/// Interceptors added here stay registered for the life of the bus.
#[derive(Default)]
pub struct SimpleCommandBusBuilder {
    pipeline: Pipeline,
}

impl SimpleCommandBusBuilder {
    /// Share an enhancer registry populated by a bootstrap step.
    pub fn enhancers(mut self, enhancers: EnhancerRegistry) -> Self {
        self.pipeline.set_enhancers(enhancers);
        self
    }

    pub fn dispatch_interceptor(self, interceptor: Arc<dyn DispatchInterceptor>) -> Self {
        self.pipeline.register_dispatch_interceptor(interceptor);
        self
    }

    pub fn handler_interceptor(self, interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        self.pipeline.register_handler_interceptor(interceptor);
        self
    }

    pub fn build(self) -> SimpleCommandBus {
        SimpleCommandBus {
            pipeline: self.pipeline,
        }
    }
}
