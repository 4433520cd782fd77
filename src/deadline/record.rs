//! Deadline identifiers, state and the persisted record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Metadata};

use super::error::DeadlineError;
use super::scope::ScopeDescriptor;

pub const DEADLINE_ID: &str = "deadline-id";
pub const DEADLINE_NAME: &str = "deadline-name";
pub const SCOPE_TYPE: &str = "scope-type";
pub const SCOPE_ID: &str = "scope-id";

/// Identifier of one scheduling call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadlineId(String);

impl DeadlineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeadlineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeadlineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeadlineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeadlineId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Where a deadline is in its life. `Fired` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeadlineStatus {
    Scheduled,
    Fired,
    Cancelled,
}

impl DeadlineStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeadlineStatus::Scheduled)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            DeadlineStatus::Scheduled => 0,
            DeadlineStatus::Fired => 1,
            DeadlineStatus::Cancelled => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => DeadlineStatus::Scheduled,
            1 => DeadlineStatus::Fired,
            _ => DeadlineStatus::Cancelled,
        }
    }
}

/// What the timer service persists for each deadline.
///
/// Serialized as JSON with the message payload base64-encoded, so the timer
/// can store it as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineRecord {
    pub id: DeadlineId,
    pub name: String,
    pub scope: ScopeDescriptor,
    pub trigger_time: DateTime<Utc>,
    pub message_id: String,
    pub message_name: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

mod payload_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(payload).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl DeadlineRecord {
    pub fn new(
        id: DeadlineId,
        name: impl Into<String>,
        scope: ScopeDescriptor,
        trigger_time: DateTime<Utc>,
        message: Message,
    ) -> Self {
        let (message_id, message_name, payload, metadata) = message.into_parts();
        Self {
            id,
            name: name.into(),
            scope,
            trigger_time,
            message_id,
            message_name,
            payload,
            metadata: metadata.to_map(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DeadlineError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeadlineError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The message delivered when the deadline fires, tagged with the
    /// deadline and scope it belongs to.
    pub fn to_message(&self) -> Message {
        let metadata = Metadata::from_map(self.metadata.clone())
            .with(DEADLINE_ID, self.id.as_str())
            .with(DEADLINE_NAME, self.name.as_str())
            .with(SCOPE_TYPE, self.scope.scope_type())
            .with(SCOPE_ID, self.scope.id());
        Message::from_parts(
            self.message_id.as_str(),
            self.message_name.as_str(),
            self.payload.clone(),
            metadata,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_survives_json_storage() {
        let message = Message::with_string_payload("payment_due", "{\"amount\":10}")
            .with_metadata("tenant", "acme");
        let record = DeadlineRecord::new(
            DeadlineId::from("d-1"),
            "payment_due",
            ScopeDescriptor::aggregate("Order", "order-1"),
            Utc::now(),
            message,
        );

        let bytes = record.to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"payload\":\"eyJhbW91bnQiOjEwfQ==\""));

        assert_eq!(DeadlineRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn delivered_message_carries_deadline_metadata() {
        let record = DeadlineRecord::new(
            DeadlineId::from("d-2"),
            "reminder",
            ScopeDescriptor::saga("OrderSaga", "saga-9"),
            Utc::now(),
            Message::with_id("m-1", "reminder", vec![1, 2, 3]).with_metadata("tenant", "acme"),
        );

        let message = record.to_message();
        assert_eq!(message.id(), "m-1");
        assert_eq!(message.name(), "reminder");
        assert_eq!(message.payload(), &[1, 2, 3]);
        assert_eq!(message.metadata().get(DEADLINE_ID), Some("d-2"));
        assert_eq!(message.metadata().get(DEADLINE_NAME), Some("reminder"));
        assert_eq!(message.metadata().get(SCOPE_TYPE), Some("OrderSaga"));
        assert_eq!(message.metadata().get(SCOPE_ID), Some("saga-9"));
        assert_eq!(message.metadata().get("tenant"), Some("acme"));
    }

    #[test]
    fn corrupt_record_is_an_encoding_error() {
        assert!(matches!(
            DeadlineRecord::from_bytes(b"not json"),
            Err(DeadlineError::Encoding(_))
        ));
    }
}
