use serde_json::Value;

use crate::error::HandlerError;
use crate::unit_of_work::UnitOfWork;

/// Terminal handler for one command name.
///
/// The message is reachable through `uow.message()`. The returned value
/// becomes the success payload of the command's result.
///
/// Closures of the form `|uow: &mut UnitOfWork| -> Result<Value, HandlerError>`
/// implement this trait.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, uow: &mut UnitOfWork) -> Result<Value, HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&mut UnitOfWork) -> Result<Value, HandlerError> + Send + Sync,
{
    fn handle(&self, uow: &mut UnitOfWork) -> Result<Value, HandlerError> {
        self(uow)
    }
}
