//! Transport-boundary representation of a message.

use chrono::{DateTime, Utc};
use common::{Metadata, Payload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::message::{Message, MessageId, MessageType};

/// A message as it arrives from (or leaves to) a transport.
///
/// The wire shape carries no message type; the receiving side resolves it
/// through the [`SchemaRegistry`](crate::SchemaRegistry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub message_name: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub metadata: Metadata,
    pub uuid: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Converts a wire message into a message of the given type.
    pub fn from_wire(wire: WireMessage, message_type: MessageType) -> Result<Self> {
        let id = MessageId::from_uuid(Uuid::parse_str(&wire.uuid)?);
        Message::builder()
            .id(id)
            .name(wire.message_name)
            .message_type(message_type)
            .payload(wire.payload)
            .created_at(wire.created_at)
            .build()
            .map(|message| message.with_metadata(wire.metadata))
    }

    /// Converts the message into its wire representation.
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            message_name: self.name().to_string(),
            payload: self.payload().clone(),
            metadata: self.metadata().clone(),
            uuid: self.id().to_string(),
            created_at: self.created_at(),
        }
    }
}
