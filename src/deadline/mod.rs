//! Deadlines: timed messages delivered back to the aggregate or saga that
//! scheduled them.
//!
//! The [`DeadlineManager`] tracks each deadline's state and hands the
//! persisted record to a [`TimerService`]. When the timer fires, the manager
//! resolves the live owners of the deadline's scope through a
//! [`ScopeAwareProvider`] and delivers the message to each of them in a
//! fresh unit of work.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sourced_dispatch::deadline::*;
//!
//! let scopes = ScopeRegistry::new();
//! let manager = DeadlineManager::builder()
//!     .timer(Arc::new(ThreadTimerService::new()))
//!     .scopes(Arc::new(scopes.clone()))
//!     .build()?;
//!
//! let order = ScopeDescriptor::aggregate("Order", "order-1");
//! scopes.register(order.clone(), Arc::new(|uow: &mut UnitOfWork| {
//!     println!("deadline {} fired", uow.message().name());
//!     Ok(())
//! }));
//!
//! manager.schedule_after(&order, "payment_due", Vec::new(), Duration::from_secs(30))?;
//! ```

mod error;
mod manager;
mod record;
mod scope;
pub mod timer;

pub use error::{DeadlineError, TimerError};
pub use manager::{DeadlineManager, DeadlineManagerBuilder};
pub use record::{DeadlineId, DeadlineRecord, DeadlineStatus, DEADLINE_ID, DEADLINE_NAME, SCOPE_ID, SCOPE_TYPE};
pub use scope::{ScopeAware, ScopeAwareProvider, ScopeDescriptor, ScopeKind, ScopeRegistry};
pub use timer::{FireCallback, ManualTimerService, ThreadTimerService, TimerConfig, TimerService};
