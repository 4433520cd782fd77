use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::HandlerError;
use crate::message::Message;

/// Transforms or rejects a message before it reaches the bus.
///
/// Dispatch interceptors run once per dispatched message, in registration
/// order, on the dispatching thread. Returning an error stops the dispatch;
/// the error is delivered to the callback.
pub trait DispatchInterceptor: Send + Sync {
    fn handle(&self, message: Message) -> Result<Message, HandlerError>;
}

impl<F> DispatchInterceptor for F
where
    F: Fn(Message) -> Result<Message, HandlerError> + Send + Sync,
{
    fn handle(&self, message: Message) -> Result<Message, HandlerError> {
        self(message)
    }
}

/// Run `message` through `interceptors` in order. A panicking interceptor
/// counts as a rejection.
pub(crate) fn apply(
    interceptors: &[Arc<dyn DispatchInterceptor>],
    message: Message,
) -> Result<Message, HandlerError> {
    interceptors.iter().try_fold(message, |message, interceptor| {
        panic::catch_unwind(AssertUnwindSafe(|| interceptor.handle(message)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interceptors_apply_in_order() {
        let interceptors: Vec<Arc<dyn DispatchInterceptor>> = vec![
            Arc::new(|m: Message| -> Result<Message, HandlerError> { Ok(m.with_metadata("step", "1")) }),
            Arc::new(|m: Message| -> Result<Message, HandlerError> {
                let prev = m.metadata().get("step").unwrap_or_default().to_string();
                Ok(m.with_metadata("step", format!("{}2", prev)))
            }),
        ];

        let out = apply(&interceptors, Message::with_string_payload("cmd", "")).unwrap();
        assert_eq!(out.metadata().get("step"), Some("12"));
    }

    #[test]
    fn rejection_short_circuits() {
        let interceptors: Vec<Arc<dyn DispatchInterceptor>> = vec![
            Arc::new(|_: Message| -> Result<Message, HandlerError> { Err(HandlerError::Rejected("blocked".into())) }),
            Arc::new(|_: Message| -> Result<Message, HandlerError> { panic!("must not run") }),
        ];

        let err = apply(&interceptors, Message::with_string_payload("cmd", "")).unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(s) if s == "blocked"));
    }

    #[test]
    fn panicking_interceptor_is_a_rejection() {
        let interceptors: Vec<Arc<dyn DispatchInterceptor>> =
            vec![Arc::new(|_: Message| -> Result<Message, HandlerError> { panic!("bad interceptor") })];

        let err = apply(&interceptors, Message::with_string_payload("cmd", "")).unwrap_err();
        assert!(matches!(err, HandlerError::Panicked(_)));
    }
}
