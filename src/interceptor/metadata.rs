use crate::error::HandlerError;
use crate::message::{Message, Metadata};

use super::DispatchInterceptor;

/// Stamps fixed metadata onto every dispatched message.
///
/// Keys the message already carries are left alone unless the interceptor
/// was built with [`overwrite`](MetadataInterceptor::overwrite).
#[derive(Debug, Clone, Default)]
pub struct MetadataInterceptor {
    entries: Metadata,
    overwrite: bool,
}

impl MetadataInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries = self.entries.with(key, value);
        self
    }

    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

impl DispatchInterceptor for MetadataInterceptor {
    fn handle(&self, message: Message) -> Result<Message, HandlerError> {
        let stamped = if self.overwrite {
            message.metadata().merged(&self.entries)
        } else {
            self.entries.merged(message.metadata())
        };
        Ok(message.and_metadata(&stamped))
    }
}
