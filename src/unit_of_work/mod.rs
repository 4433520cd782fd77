//! Unit of Work: the transactional boundary around handler execution.
//!
//! Every message handled by the command bus or delivered by the deadline
//! manager runs inside its own [`UnitOfWork`]. Handlers attach resources and
//! register work for the commit, rollback and cleanup phases; the unit of
//! work drives those phases once the handler returns.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sourced_dispatch::{Message, UnitOfWork};
//!
//! let mut uow = UnitOfWork::start(Message::with_string_payload("order.create", "{}"));
//! let value = uow.execute_with_result(|uow| {
//!     uow.on_commit(|_| Ok(()))?;
//!     Ok(serde_json::json!({ "ok": true }))
//! })?;
//! ```

mod error;
mod phase;
mod resources;
#[allow(clippy::module_inception)]
mod unit_of_work;

pub use error::UnitOfWorkError;
pub use phase::Phase;
pub use resources::Resources;
pub use unit_of_work::UnitOfWork;
