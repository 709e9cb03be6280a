//! Conversion between messages and stored event envelopes.

use std::collections::{BTreeMap, HashMap};

use common::Metadata;
use event_store::{EventEnvelope, EventId, StreamId, Version};
use messaging::{Message, MessageId, MessageType, MessagingError};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Rebuilds the event message recorded in `envelope`.
///
/// The message keeps the envelope's event id and timestamp, so a replayed
/// event is indistinguishable from the one that was broadcast.
pub fn message_from_envelope(envelope: &EventEnvelope) -> Result<Message> {
    let Value::Object(payload) = &envelope.payload else {
        return Err(MessagingError::PayloadNotAnObject(envelope.event_type.clone()).into());
    };

    // HashMap order is arbitrary; sort so replays yield identical metadata.
    let sorted: BTreeMap<&String, &Value> = envelope.metadata.iter().collect();
    let metadata: Metadata = sorted
        .into_iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let message = Message::builder()
        .id(MessageId::from_uuid(envelope.event_id.as_uuid()))
        .name(envelope.event_type.clone())
        .message_type(MessageType::Event)
        .payload(payload.clone())
        .created_at(envelope.timestamp)
        .build()?;
    Ok(message.with_metadata(metadata))
}

/// Wraps an event message for appending at `version` of `stream`.
pub fn envelope_from_message(
    message: &Message,
    stream: &StreamId,
    version: Version,
) -> Result<EventEnvelope> {
    if message.message_type() != MessageType::Event {
        return Err(EngineError::UnexpectedMessageType {
            name: message.name().to_string(),
            expected: MessageType::Event,
            actual: message.message_type(),
        });
    }

    let metadata: HashMap<String, Value> = message
        .metadata()
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(EventEnvelope::builder()
        .event_id(EventId::from_uuid(message.id().as_uuid()))
        .event_type(message.name())
        .stream(stream)
        .version(version)
        .timestamp(message.created_at())
        .payload_raw(message.payload_value())
        .metadata_map(metadata)
        .build()?)
}

/// Converts a loaded stream into messages, preserving order.
pub fn messages_from_envelopes(envelopes: &[EventEnvelope]) -> Result<Vec<Message>> {
    envelopes.iter().map(message_from_envelope).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream() -> StreamId {
        StreamId::new("User", "u-1")
    }

    #[test]
    fn envelope_round_trip_keeps_identity_and_time() {
        let event = Message::from_json(
            "UserWasRegistered",
            MessageType::Event,
            json!({"userId": "u-1", "username": "John"}),
        )
        .unwrap()
        .with_added_metadata("causation_id", json!("c-1"));

        let envelope = envelope_from_message(&event, &stream(), Version::first()).unwrap();
        assert_eq!(envelope.event_id.as_uuid(), event.id().as_uuid());
        assert_eq!(envelope.stream_id(), stream());
        assert_eq!(envelope.version, Version::first());

        let restored = message_from_envelope(&envelope).unwrap();
        assert_eq!(restored, event);
        assert_eq!(restored.causation_id(), Some("c-1"));
    }

    #[test]
    fn commands_cannot_be_stored() {
        let command = Message::command("RegisterUser", Default::default());
        assert!(matches!(
            envelope_from_message(&command, &stream(), Version::first()),
            Err(EngineError::UnexpectedMessageType { .. })
        ));
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        let envelope = EventEnvelope::builder()
            .event_type("Broken")
            .stream(&stream())
            .version(Version::first())
            .payload_raw(json!([1, 2]))
            .build()
            .unwrap();

        assert!(matches!(
            message_from_envelope(&envelope),
            Err(EngineError::Messaging(MessagingError::PayloadNotAnObject(_)))
        ));
    }
}
