use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Metadata, Payload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MessagingError, Result};

/// Well-known metadata keys.
pub mod meta {
    /// Id of the message that caused this one.
    pub const CAUSATION_ID: &str = "causation_id";
    /// Name of the message that caused this one.
    pub const CAUSATION_NAME: &str = "causation_name";
    /// Id shared by every message of one logical flow.
    pub const CORRELATION_ID: &str = "correlation_id";
    /// Aggregate type of a recorded event.
    pub const AGGREGATE_TYPE: &str = "_aggregate_type";
    /// Aggregate id of a recorded event.
    pub const AGGREGATE_ID: &str = "_aggregate_id";
    /// Stream version reached by a recorded event.
    pub const AGGREGATE_VERSION: &str = "_aggregate_version";
}

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Kind of message flowing through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Command,
    Event,
    Query,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::Command => "command",
            MessageType::Event => "event",
            MessageType::Query => "query",
        };
        f.write_str(name)
    }
}

/// Immutable message envelope.
///
/// The payload is shared behind an [`Arc`], so the `with_*` methods are
/// copy-on-write: they return a new message and leave the original intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    name: String,
    message_type: MessageType,
    payload: Arc<Payload>,
    metadata: Metadata,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a fresh id, the current time and no metadata.
    pub fn new(name: impl Into<String>, message_type: MessageType, payload: Payload) -> Self {
        Self {
            id: MessageId::new(),
            name: name.into(),
            message_type,
            payload: Arc::new(payload),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Creates a command message.
    pub fn command(name: impl Into<String>, payload: Payload) -> Self {
        Self::new(name, MessageType::Command, payload)
    }

    /// Creates an event message.
    pub fn event(name: impl Into<String>, payload: Payload) -> Self {
        Self::new(name, MessageType::Event, payload)
    }

    /// Creates a query message.
    pub fn query(name: impl Into<String>, payload: Payload) -> Self {
        Self::new(name, MessageType::Query, payload)
    }

    /// Creates a message from a JSON value, which must be an object.
    pub fn from_json(
        name: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let name = name.into();
        match payload {
            serde_json::Value::Object(map) => Ok(Self::new(name, message_type, map)),
            _ => Err(MessagingError::PayloadNotAnObject(name)),
        }
    }

    /// Creates a new message builder.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the payload as an owned JSON object value.
    pub fn payload_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.payload.as_ref().clone())
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload_value())?)
    }

    /// Returns a payload field.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// Returns a payload field, or `default` when it is absent.
    pub fn get_or<'a>(
        &'a self,
        key: &str,
        default: &'a serde_json::Value,
    ) -> &'a serde_json::Value {
        self.payload.get(key).unwrap_or(default)
    }

    /// Returns a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Returns the causation id recorded in metadata, if any.
    pub fn causation_id(&self) -> Option<&str> {
        self.metadata.get(meta::CAUSATION_ID).and_then(|v| v.as_str())
    }

    /// Returns the correlation id recorded in metadata, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get(meta::CORRELATION_ID).and_then(|v| v.as_str())
    }

    /// Returns a copy with one more metadata entry. The payload is shared.
    pub fn with_added_metadata(&self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert(key.into(), value);
        Self {
            id: self.id,
            name: self.name.clone(),
            message_type: self.message_type,
            payload: Arc::clone(&self.payload),
            metadata,
            created_at: self.created_at,
        }
    }

    /// Returns a copy with the metadata replaced. The payload is shared.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            message_type: self.message_type,
            payload: Arc::clone(&self.payload),
            metadata,
            created_at: self.created_at,
        }
    }

    /// Returns a copy carrying a different payload, keeping identity and metadata.
    pub fn with_payload(&self, payload: Payload) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            message_type: self.message_type,
            payload: Arc::new(payload),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }

    /// Returns true if both messages share the same payload allocation.
    pub fn shares_payload_with(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

/// Builder for constructing messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    id: Option<MessageId>,
    name: Option<String>,
    message_type: Option<MessageType>,
    payload: Payload,
    metadata: Metadata,
    created_at: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the message name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the message type.
    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Replaces the whole payload.
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the payload from a serializable value, which must serialize to an object.
    pub fn payload_from<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        match serde_json::to_value(payload)? {
            serde_json::Value::Object(map) => {
                self.payload = map;
                Ok(self)
            }
            _ => Err(MessagingError::PayloadNotAnObject(
                self.name.clone().unwrap_or_default(),
            )),
        }
    }

    /// Adds a payload field.
    pub fn field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the message, failing if name or type are missing.
    pub fn build(self) -> Result<Message> {
        Ok(Message {
            id: self.id.unwrap_or_default(),
            name: self.name.ok_or(MessagingError::MissingField("name"))?,
            message_type: self
                .message_type
                .ok_or(MessagingError::MissingField("message_type"))?,
            payload: Arc::new(self.payload),
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}
