use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::HandlerError;
use crate::handler::MessageHandler;
use crate::unit_of_work::UnitOfWork;

/// Wraps the invocation of a command handler.
///
/// The interceptor decides whether and when the handler runs by calling
/// [`InterceptorChain::proceed`]. Returning without proceeding suppresses
/// the handler; whatever the interceptor returns becomes the result.
pub trait HandlerInterceptor: Send + Sync {
    fn handle(&self, uow: &mut UnitOfWork, chain: InterceptorChain) -> Result<Value, HandlerError>;
}

impl<F> HandlerInterceptor for F
where
    F: Fn(&mut UnitOfWork, InterceptorChain) -> Result<Value, HandlerError> + Send + Sync,
{
    fn handle(&self, uow: &mut UnitOfWork, chain: InterceptorChain) -> Result<Value, HandlerError> {
        self(uow, chain)
    }
}

/// Continuation handed to each [`HandlerInterceptor`].
///
/// A chain is built per dispatch. `proceed` takes the chain by value, so an
/// interceptor can continue at most once.
pub struct InterceptorChain {
    interceptors: Arc<Vec<Arc<dyn HandlerInterceptor>>>,
    position: usize,
    handler: Arc<dyn MessageHandler>,
}

impl InterceptorChain {
    pub fn new(
        interceptors: Arc<Vec<Arc<dyn HandlerInterceptor>>>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            interceptors,
            position: 0,
            handler,
        }
    }

    /// Invoke the next interceptor, or the handler once all interceptors ran.
    pub fn proceed(self, uow: &mut UnitOfWork) -> Result<Value, HandlerError> {
        match self.interceptors.get(self.position).cloned() {
            Some(interceptor) => {
                let next = InterceptorChain {
                    interceptors: self.interceptors,
                    position: self.position + 1,
                    handler: self.handler,
                };
                interceptor.handle(uow, next)
            }
            None => self.handler.handle(uow),
        }
    }

    /// Interceptors not yet invoked.
    pub fn remaining(&self) -> usize {
        self.interceptors.len().saturating_sub(self.position)
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("position", &self.position)
            .field("remaining", &self.remaining())
            .finish()
    }
}
