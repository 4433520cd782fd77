use std::fmt;

type CancelFn = Box<dyn FnOnce() -> bool + Send + Sync>;

/// Handle returned by every `subscribe` / `register_*` call.
///
/// Dropping the handle leaves the registration in place; call
/// [`cancel`](Registration::cancel) to undo it.
pub struct Registration {
    cancel: CancelFn,
}

impl Registration {
    pub fn new(cancel: impl FnOnce() -> bool + Send + Sync + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Undo the registration.
    ///
    /// Returns `true` if something was removed. Returns `false` if the
    /// registration had already been replaced or removed.
    pub fn cancel(self) -> bool {
        (self.cancel)()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").finish_non_exhaustive()
    }
}
