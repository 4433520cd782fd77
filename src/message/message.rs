//! The message envelope dispatched through the bus.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::command::Command;
use super::metadata::Metadata;

/// A message flowing through the dispatch pipeline.
///
/// Commands and deadline deliveries are both messages. The `name` is the
/// routing key: the command bus uses it to find the single handler for a
/// command, the deadline manager uses it as the deadline name.
///
/// Messages are immutable once built. Enriching metadata returns a new
/// message carrying the same identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    id: String,
    name: String,
    payload: Vec<u8>,
    metadata: Metadata,
}

impl Message {
    /// Create a message with a freshly generated identifier.
    pub fn new(name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, payload)
    }

    /// Create a message with a caller-supplied identifier.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload,
            metadata: Metadata::new(),
        }
    }

    /// Rebuild a message from all of its parts.
    pub fn from_parts(
        id: impl Into<String>,
        name: impl Into<String>,
        payload: Vec<u8>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload,
            metadata,
        }
    }

    /// Create a message with a bitcode-serialized payload.
    pub fn encode<T: Serialize>(name: impl Into<String>, payload: &T) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        Ok(Self::new(name, bytes))
    }

    /// Create a message with a JSON-serialized payload.
    pub fn encode_json<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::new(name, bytes))
    }

    /// Create a command message routed by the command's declared name.
    pub fn command<C: Command + Serialize>(command: &C) -> Result<Self, bitcode::Error> {
        Self::encode(C::NAME, command)
    }

    /// Create a message with a string payload.
    pub fn with_string_payload(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(name, payload.into().into_bytes())
    }

    /// Decode the payload from bitcode binary format.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    /// Decode the payload from JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The routing key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Return a copy of this message with one more metadata entry.
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metadata: self.metadata.with(key, value),
            ..self.clone()
        }
    }

    /// Return a copy of this message with `metadata` merged over its own.
    pub fn and_metadata(&self, metadata: &Metadata) -> Self {
        Self {
            metadata: self.metadata.merged(metadata),
            ..self.clone()
        }
    }

    /// Split the message into `(id, name, payload, metadata)`.
    pub fn into_parts(self) -> (String, String, Vec<u8>, Metadata) {
        (self.id, self.name, self.payload, self.metadata)
    }
}
