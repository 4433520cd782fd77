//! Interceptors around dispatch and handling.
//!
//! - [`DispatchInterceptor`]: `Message -> Message`, applied on the
//!   dispatching thread before the bus takes the command.
//! - [`HandlerInterceptor`]: wraps the handler inside the unit of work and
//!   continues through an explicit [`InterceptorChain`].

mod chain;
pub(crate) mod dispatch;
mod logging;
mod metadata;

pub use chain::{HandlerInterceptor, InterceptorChain};
pub use dispatch::DispatchInterceptor;
pub use logging::LoggingInterceptor;
pub use metadata::MetadataInterceptor;
