//! Result envelope delivered to command callbacks.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DispatchError, DispatchErrorKind, HandlerError};

use super::metadata::Metadata;

/// The outcome of dispatching one command.
///
/// Holds exactly one of a success payload or an exceptional cause, plus the
/// identifier of the command it answers. A handler returning `Value::Null` is
/// a success with a null payload, not an absent result.
#[derive(Debug)]
pub struct CommandResult {
    correlation_id: String,
    outcome: Result<Value, DispatchError>,
    metadata: Metadata,
}

impl CommandResult {
    /// Build a success result.
    pub fn success(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Ok(payload),
            metadata: Metadata::new(),
        }
    }

    /// Build an exceptional result.
    pub fn exceptional(correlation_id: impl Into<String>, cause: DispatchError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Err(cause),
            metadata: Metadata::new(),
        }
    }

    /// Return a copy of this result carrying `metadata`.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The identifier of the command this result answers.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_exceptional(&self) -> bool {
        self.outcome.is_err()
    }

    /// The success payload, or `None` for an exceptional result.
    pub fn payload(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// The exceptional cause, or `None` for a success.
    pub fn exception(&self) -> Option<&DispatchError> {
        self.outcome.as_ref().err()
    }

    /// Shorthand for `exception().map(DispatchError::kind)`.
    pub fn exception_kind(&self) -> Option<DispatchErrorKind> {
        self.exception().map(DispatchError::kind)
    }

    /// Deserialize the success payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>, HandlerError> {
        match self.payload() {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn into_result(self) -> Result<Value, DispatchError> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_success_is_not_exceptional() {
        let result = CommandResult::success("cmd-1", Value::Null);
        assert!(!result.is_exceptional());
        assert_eq!(result.payload(), Some(&Value::Null));
        assert!(result.exception().is_none());
        assert_eq!(result.correlation_id(), "cmd-1");
    }

    #[test]
    fn exceptional_has_no_payload() {
        let result = CommandResult::exceptional(
            "cmd-1",
            DispatchError::NoHandler {
                command: "ping".into(),
            },
        );
        assert!(result.is_exceptional());
        assert!(result.payload().is_none());
        assert_eq!(result.exception_kind(), Some(DispatchErrorKind::NoHandler));
    }

    #[test]
    fn payload_as_decodes() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Created {
            id: String,
        }

        let result = CommandResult::success("cmd-1", json!({ "id": "o-1" }));
        let created: Option<Created> = result.payload_as().unwrap();
        assert_eq!(created, Some(Created { id: "o-1".into() }));
    }
}
