use thiserror::Error;

use crate::message::MessageType;
use crate::schema::ValidationError;

/// Errors raised while building, converting or validating messages.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// A message name was registered twice.
    #[error("Message {0} is already registered")]
    DuplicateMessage(String),

    /// No schema is registered under this name.
    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    /// The message is registered, but as a different message type.
    #[error("Message {name} is registered as {expected}, got {actual}")]
    MessageTypeMismatch {
        name: String,
        expected: MessageType,
        actual: MessageType,
    },

    /// The payload does not satisfy the registered schema.
    #[error("Payload of {message_name} is invalid: {error}")]
    SchemaViolation {
        message_name: String,
        error: ValidationError,
    },

    /// A required builder field was not set.
    #[error("Message field {0} is required")]
    MissingField(&'static str),

    /// The payload is not a JSON object.
    #[error("Payload of {0} must be a JSON object")]
    PayloadNotAnObject(String),

    /// The wire uuid could not be parsed.
    #[error("Invalid message uuid: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
