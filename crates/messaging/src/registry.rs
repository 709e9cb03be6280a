//! Registry of message names, types and schemas.

use std::collections::HashMap;

use crate::error::{MessagingError, Result};
use crate::message::{Message, MessageType};
use crate::schema::{Schema, SchemaValidator};
use crate::wire::WireMessage;

/// A registered message.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    pub message_name: String,
    pub message_type: MessageType,
    pub schema: Schema,
    /// Name of the concrete payload type, for flavours that map messages to types.
    pub payload_type_hint: Option<String>,
}

/// Explicit registry of every message the engine accepts.
///
/// Names are unique across commands, events and queries.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: HashMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command(&mut self, name: impl Into<String>, schema: Schema) -> Result<()> {
        self.register(name.into(), MessageType::Command, schema, None)
    }

    pub fn register_event(&mut self, name: impl Into<String>, schema: Schema) -> Result<()> {
        self.register(name.into(), MessageType::Event, schema, None)
    }

    pub fn register_query(&mut self, name: impl Into<String>, schema: Schema) -> Result<()> {
        self.register(name.into(), MessageType::Query, schema, None)
    }

    /// Registers a message along with the name of its concrete payload type.
    pub fn register_with_type_hint(
        &mut self,
        name: impl Into<String>,
        message_type: MessageType,
        schema: Schema,
        type_hint: impl Into<String>,
    ) -> Result<()> {
        self.register(name.into(), message_type, schema, Some(type_hint.into()))
    }

    fn register(
        &mut self,
        name: String,
        message_type: MessageType,
        schema: Schema,
        payload_type_hint: Option<String>,
    ) -> Result<()> {
        if self.entries.contains_key(&name) {
            return Err(MessagingError::DuplicateMessage(name));
        }

        tracing::debug!(message_name = %name, %message_type, "message registered");
        self.entries.insert(
            name.clone(),
            SchemaEntry {
                message_name: name,
                message_type,
                schema,
                payload_type_hint,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the registered type of a message name.
    pub fn message_type(&self, name: &str) -> Option<MessageType> {
        self.entries.get(name).map(|e| e.message_type)
    }

    /// Returns true if `name` is registered with exactly this message type.
    pub fn is_registered_as(&self, name: &str, message_type: MessageType) -> bool {
        self.message_type(name) == Some(message_type)
    }

    /// Returns the number of registered messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries of one message type.
    pub fn entries_of(&self, message_type: MessageType) -> impl Iterator<Item = &SchemaEntry> {
        self.entries
            .values()
            .filter(move |e| e.message_type == message_type)
    }

    /// Validates a message payload against its registered schema.
    ///
    /// Fails if the name is unknown, registered as another message type, or
    /// if the payload violates the schema.
    pub fn validate(&self, validator: &dyn SchemaValidator, message: &Message) -> Result<()> {
        let entry = self
            .entries
            .get(message.name())
            .ok_or_else(|| MessagingError::UnknownMessage(message.name().to_string()))?;

        if entry.message_type != message.message_type() {
            return Err(MessagingError::MessageTypeMismatch {
                name: entry.message_name.clone(),
                expected: entry.message_type,
                actual: message.message_type(),
            });
        }

        validator
            .validate(&entry.schema, &message.payload_value())
            .map_err(|error| MessagingError::SchemaViolation {
                message_name: entry.message_name.clone(),
                error,
            })
    }

    /// Converts a wire message, resolving its type from the registry.
    pub fn message_from_wire(&self, wire: WireMessage) -> Result<Message> {
        let message_type = self
            .message_type(&wire.message_name)
            .ok_or_else(|| MessagingError::UnknownMessage(wire.message_name.clone()))?;
        Message::from_wire(wire, message_type)
    }
}
