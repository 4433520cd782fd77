//! Command dispatch runtime for CQRS applications.
//!
//! - **Command buses** route each command to exactly one handler, either on
//!   the dispatching thread ([`SimpleCommandBus`]) or on an executor
//!   ([`AsyncCommandBus`]).
//! - **Interceptors** transform or reject commands before dispatch
//!   ([`DispatchInterceptor`]) and wrap handler invocation
//!   ([`HandlerInterceptor`]).
//! - **Units of work** give every handled message commit, rollback and
//!   cleanup phases ([`UnitOfWork`]).
//! - **Deadlines** deliver timed messages back to the aggregate or saga that
//!   scheduled them ([`DeadlineManager`]).
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use sourced_dispatch::{Command, CommandBus, Message, SimpleCommandBus, UnitOfWork};
//!
//! #[derive(Serialize, Deserialize, Command)]
//! #[command(name = "order.create")]
//! struct CreateOrder { id: String }
//!
//! let bus = SimpleCommandBus::new();
//! bus.subscribe_command(|command: CreateOrder, uow: &mut UnitOfWork| {
//!     uow.on_commit(|_| Ok(()))?;
//!     Ok(serde_json::json!({ "created": command.id }))
//! });
//!
//! let message = Message::command(&CreateOrder { id: "order-1".into() })?;
//! let result = bus.dispatch_and_wait(message);
//! ```

// Lets `#[derive(Command)]` expand to `sourced_dispatch::...` inside this crate too.
extern crate self as sourced_dispatch;

pub mod command_bus;
pub mod deadline;
pub mod error;
pub mod executor;
pub mod handler;
pub mod interceptor;
pub mod message;
pub mod unit_of_work;

pub use command_bus::{
    AsyncCommandBus, AsyncCommandBusBuilder, CommandBus, CommandCallback, LoggingCallback,
    NoOpCallback, SimpleCommandBus, SimpleCommandBusBuilder,
};
pub use deadline::{
    DeadlineError, DeadlineId, DeadlineManager, DeadlineManagerBuilder, DeadlineRecord,
    DeadlineStatus, ManualTimerService, ScopeAware, ScopeAwareProvider, ScopeDescriptor, ScopeKind,
    ScopeRegistry, ThreadTimerService, TimerConfig, TimerError, TimerService,
};
pub use error::{DispatchError, DispatchErrorKind, HandlerError};
#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;
pub use executor::{
    ExecutorError, ExecutorService, InlineExecutor, PoolConfig, PoolStats, Task, TaskExecutor,
    ThreadPoolExecutor,
};
pub use handler::{EnhancerRegistry, HandlerEnhancer, HandlerRegistry, MessageHandler, Registration};
pub use interceptor::{
    DispatchInterceptor, HandlerInterceptor, InterceptorChain, LoggingInterceptor,
    MetadataInterceptor,
};
pub use message::{Command, CommandResult, Message, Metadata, CORRELATION_ID};
pub use unit_of_work::{Phase, Resources, UnitOfWork, UnitOfWorkError};

// Derive macro shares the trait's name, like serde's `Serialize`.
#[cfg(feature = "macros")]
pub use sourced_dispatch_macros::Command;
