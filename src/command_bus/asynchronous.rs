//! Command bus that hands each command to an executor.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::executor::{
    ExecutorError, ExecutorService, PoolConfig, Task, TaskExecutor, ThreadPoolExecutor,
};
use crate::handler::{EnhancerRegistry, HandlerEnhancer, HandlerRegistry, MessageHandler, Registration};
use crate::interceptor::{DispatchInterceptor, HandlerInterceptor};
use crate::message::{CommandResult, Message};

use super::pipeline::{Execution, Pipeline, Prepared};
use super::{CommandBus, CommandCallback};

enum Executor {
    /// Submit-only; the bus never tries to stop it.
    Plain(Arc<dyn TaskExecutor>),
    Service(Arc<dyn ExecutorService>),
}

impl Executor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        match self {
            Executor::Plain(executor) => executor.execute(task),
            Executor::Service(executor) => executor.execute(task),
        }
    }
}

/// A dispatch accepted by the bus but not yet run.
///
/// If the executor drops the task without running it, the callback still
/// gets a `ResultLost` result.
struct Pending {
    work: Option<(Execution, Box<dyn CommandCallback>)>,
}

impl Pending {
    fn take(slot: &Mutex<Pending>) -> Option<(Execution, Box<dyn CommandCallback>)> {
        slot.lock().unwrap_or_else(PoisonError::into_inner).work.take()
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some((execution, callback)) = self.work.take() {
            let message = execution.into_message();
            warn!(message_id = %message.id(), command = %message.name(), "executor dropped command without running it");
            let result = CommandResult::exceptional(message.id(), DispatchError::ResultLost);
            callback.on_result(&message, result);
        }
    }
}

/// Command bus that runs each command's unit of work on an injected executor.
///
/// Dispatch interceptors and handler lookup run on the dispatching thread,
/// so submission order matches dispatch order. Handler execution order
/// across commands is only as ordered as the executor: a single-worker pool
/// preserves it, a larger pool does not.
///
/// ## Example
///
/// ```ignore
/// let bus = AsyncCommandBus::builder()
///     .pool_config(PoolConfig { workers: 4, ..Default::default() })
///     .build()?;
///
/// bus.subscribe("order.create", Arc::new(create_order));
/// bus.dispatch(message, Box::new(|_: &Message, result: CommandResult| {
///     println!("done: {:?}", result);
/// }));
///
/// bus.shutdown();
/// ```
pub struct AsyncCommandBus {
    pipeline: Pipeline,
    executor: Executor,
    shut_down: AtomicBool,
}

impl AsyncCommandBus {
    pub fn builder() -> AsyncCommandBusBuilder {
        AsyncCommandBusBuilder::default()
    }

    /// Bus over a plain executor, which the bus will never shut down.
    pub fn with_executor(executor: Arc<dyn TaskExecutor>) -> Self {
        Self::from_parts(Pipeline::default(), Executor::Plain(executor))
    }

    /// Bus over an executor service, shut down together with the bus.
    pub fn with_executor_service(executor: Arc<dyn ExecutorService>) -> Self {
        Self::from_parts(Pipeline::default(), Executor::Service(executor))
    }

    fn from_parts(pipeline: Pipeline, executor: Executor) -> Self {
        Self {
            pipeline,
            executor,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        self.pipeline.handlers()
    }

    pub fn register_enhancer(&self, enhancer: Arc<dyn HandlerEnhancer>) -> Registration {
        self.pipeline.enhancers().register_enhancer(enhancer)
    }

    /// Stop accepting commands.
    ///
    /// An executor service is shut down once, no matter how often this is
    /// called. A plain executor is left untouched.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.executor {
            Executor::Service(executor) => {
                debug!("command bus shutting down executor");
                executor.shutdown();
            }
            Executor::Plain(_) => debug!("command bus shut down"),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl CommandBus for AsyncCommandBus {
    fn dispatch(&self, command: Message, callback: Box<dyn CommandCallback>) {
        if self.is_shutdown() {
            debug!(message_id = %command.id(), command = %command.name(), "rejecting command after shutdown");
            let result = CommandResult::exceptional(command.id(), DispatchError::BusShutdown);
            callback.on_result(&command, result);
            return;
        }

        let execution = match self.pipeline.prepare(command) {
            Prepared::Done(message, result) => {
                callback.on_result(&message, result);
                return;
            }
            Prepared::Ready(execution) => execution,
        };

        let slot = Arc::new(Mutex::new(Pending {
            work: Some((execution, callback)),
        }));
        let task_slot = Arc::clone(&slot);
        let task: Task = Box::new(move || {
            if let Some((execution, callback)) = Pending::take(&task_slot) {
                let (message, result) = execution.run();
                callback.on_result(&message, result);
            }
        });

        if let Err(err) = self.executor.execute(task) {
            if let Some((execution, callback)) = Pending::take(&slot) {
                let message = execution.into_message();
                warn!(message_id = %message.id(), command = %message.name(), error = %err, "executor rejected command");
                let cause = match err {
                    ExecutorError::Shutdown => DispatchError::BusShutdown,
                    other => DispatchError::ExecutorRejected(other),
                };
                callback.on_result(&message, CommandResult::exceptional(message.id(), cause));
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

impl fmt::Debug for AsyncCommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCommandBus")
            .field("handlers", self.pipeline.handlers())
            .field("shut_down", &self.is_shutdown())
            .finish()
    }
}

/// Builder for [`AsyncCommandBus`].
///
/// Without an explicit executor the bus starts its own
/// [`ThreadPoolExecutor`] from the pool configuration.
#[derive(Default)]
pub struct AsyncCommandBusBuilder {
    pipeline: Pipeline,
    executor: Option<Executor>,
    pool: PoolConfig,
}

impl AsyncCommandBusBuilder {
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(Executor::Plain(executor));
        self
    }

    pub fn executor_service(mut self, executor: Arc<dyn ExecutorService>) -> Self {
        self.executor = Some(Executor::Service(executor));
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

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

    pub fn build(self) -> Result<AsyncCommandBus, ExecutorError> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Executor::Service(Arc::new(ThreadPoolExecutor::from_config(self.pool)?)),
        };
        Ok(AsyncCommandBus::from_parts(self.pipeline, executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DispatchErrorKind, HandlerError};
    use crate::unit_of_work::UnitOfWork;
    use serde_json::Value;

    /// Accepts tasks and throws them away.
    struct DroppingExecutor;

    impl TaskExecutor for DroppingExecutor {
        fn execute(&self, task: Task) -> Result<(), ExecutorError> {
            drop(task);
            Ok(())
        }
    }

    /// Refuses every task.
    struct RefusingExecutor;

    impl TaskExecutor for RefusingExecutor {
        fn execute(&self, _task: Task) -> Result<(), ExecutorError> {
            Err(ExecutorError::Rejected("queue full".into()))
        }
    }

    fn null_handler() -> Arc<dyn MessageHandler> {
        Arc::new(|_: &mut UnitOfWork| -> Result<Value, HandlerError> { Ok(Value::Null) })
    }

    #[test]
    fn dropped_task_still_completes_callback() {
        let bus = AsyncCommandBus::with_executor(Arc::new(DroppingExecutor));
        bus.subscribe("cmd", null_handler());

        let result = bus.dispatch_and_wait(Message::with_string_payload("cmd", ""));
        assert_eq!(result.exception_kind(), Some(DispatchErrorKind::ResultLost));
    }

    #[test]
    fn refused_task_is_reported_once() {
        let bus = AsyncCommandBus::with_executor(Arc::new(RefusingExecutor));
        bus.subscribe("cmd", null_handler());

        let result = bus.dispatch_and_wait(Message::with_string_payload("cmd", ""));
        assert_eq!(result.exception_kind(), Some(DispatchErrorKind::ExecutorRejected));
    }

    #[test]
    fn default_pool_runs_commands() {
        let bus = AsyncCommandBus::builder()
            .pool_config(PoolConfig {
                workers: 2,
                thread_name: "bus-test".into(),
            })
            .build()
            .unwrap();
        bus.subscribe("cmd", null_handler());

        let result = bus.dispatch_and_wait(Message::with_string_payload("cmd", ""));
        assert_eq!(result.payload(), Some(&Value::Null));

        bus.shutdown();
        let after = bus.dispatch_and_wait(Message::with_string_payload("cmd", ""));
        assert_eq!(after.exception_kind(), Some(DispatchErrorKind::BusShutdown));
    }
}
