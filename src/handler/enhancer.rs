use std::fmt;
use std::sync::Arc;

use super::list::CopyOnWriteList;
use super::{MessageHandler, Registration};

/// Decorates a handler when it is subscribed.
///
/// Enhancers are registered explicitly at bootstrap and applied in
/// registration order, so the last-registered enhancer produces the
/// outermost wrapper.
pub trait HandlerEnhancer: Send + Sync {
    fn wrap(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler>;
}

impl<F> HandlerEnhancer for F
where
    F: Fn(&str, Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> + Send + Sync,
{
    fn wrap(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> {
        self(command, handler)
    }
}

/// Shared set of handler enhancers.
#[derive(Clone, Default)]
pub struct EnhancerRegistry {
    enhancers: CopyOnWriteList<dyn HandlerEnhancer>,
}

impl EnhancerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enhancer. It applies to handlers subscribed from now on.
    pub fn register_enhancer(&self, enhancer: Arc<dyn HandlerEnhancer>) -> Registration {
        self.enhancers.push(enhancer)
    }

    pub fn enhancers(&self) -> Vec<Arc<dyn HandlerEnhancer>> {
        self.enhancers.snapshot().iter().cloned().collect()
    }

    pub fn wrap_handler(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> {
        self.enhancers
            .snapshot()
            .iter()
            .fold(handler, |handler, enhancer| enhancer.wrap(command, handler))
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.len() == 0
    }
}

impl fmt::Debug for EnhancerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnhancerRegistry")
            .field("enhancers", &self.enhancers.len())
            .finish()
    }
}
