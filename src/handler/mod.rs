//! Command handlers and their registry.

mod enhancer;
#[allow(clippy::module_inception)]
mod handler;
pub(crate) mod list;
mod registration;
mod registry;

pub use enhancer::{EnhancerRegistry, HandlerEnhancer};
pub use handler::MessageHandler;
pub use registration::Registration;
pub use registry::HandlerRegistry;
