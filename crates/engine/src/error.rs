//! Engine error types.

use event_store::{EventStoreError, Version};
use messaging::{MessageType, MessagingError, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flavour::FlavourError;
use crate::query::QueryError;

/// A business rejection raised by a handler, pre-processor or context provider.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors returned by dispatch, query resolution and state loading.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A command, event or query payload failed its schema.
    #[error("Schema violation in {message_name}: {error}")]
    SchemaViolation {
        message_name: String,
        error: ValidationError,
    },

    /// No process description is bound to the command.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// No resolver is bound to the query.
    #[error("Unknown query: {0}")]
    UnknownQuery(String),

    /// An event has no apply function for its aggregate type.
    #[error("No apply function for event {event_name} on aggregate {aggregate_type}")]
    UnknownEventForApplyMap {
        aggregate_type: String,
        event_name: String,
    },

    /// An existing-aggregate command or query targeted an empty stream.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: String,
        aggregate_id: String,
    },

    /// The identity key is absent from the command payload.
    #[error("Command {command_name} is missing aggregate identifier {key}")]
    MissingAggregateIdentifier { command_name: String, key: String },

    /// Another dispatch appended to the stream first.
    #[error(
        "Concurrency conflict on {aggregate_type} {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: String,
        expected: Version,
        actual: Version,
    },

    /// A handler or pre-processor rejected the command.
    #[error("Command {command_name} rejected: {rejection}")]
    Rejected {
        command_name: String,
        rejection: Rejection,
    },

    /// The message was not acceptable for this operation.
    #[error("Message {name} is a {actual}, expected a {expected}")]
    UnexpectedMessageType {
        name: String,
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Flavour error: {0}")]
    Flavour(FlavourError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Messaging error: {0}")]
    Messaging(MessagingError),

    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns a stable code for transport-facing error responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            EngineError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            EngineError::UnknownQuery(_) => "UNKNOWN_QUERY",
            EngineError::UnknownEventForApplyMap { .. } => "UNKNOWN_EVENT_FOR_APPLY_MAP",
            EngineError::AggregateNotFound { .. } => "AGGREGATE_NOT_FOUND",
            EngineError::MissingAggregateIdentifier { .. } => "MISSING_AGGREGATE_IDENTIFIER",
            EngineError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            EngineError::Rejected { .. } => "REJECTED",
            EngineError::UnexpectedMessageType { .. } => "UNEXPECTED_MESSAGE_TYPE",
            EngineError::Flavour(_) => "FLAVOUR_ERROR",
            EngineError::Query(QueryError::Timeout { .. }) => "QUERY_TIMEOUT",
            EngineError::Query(_) => "QUERY_FAILED",
            EngineError::Messaging(MessagingError::UnknownMessage(_)) => "UNKNOWN_MESSAGE",
            EngineError::Messaging(_) => "INVALID_MESSAGE",
            EngineError::EventStore(_) => "EVENT_STORE_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns true for errors a caller can fix by retrying or correcting input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::SchemaViolation { .. }
                | EngineError::AggregateNotFound { .. }
                | EngineError::MissingAggregateIdentifier { .. }
                | EngineError::ConcurrencyConflict { .. }
                | EngineError::Rejected { .. }
                | EngineError::UnexpectedMessageType { .. }
                | EngineError::Messaging(_)
        )
    }

    /// Lifts a flavour error raised while handling `command_name`.
    pub fn from_flavour(command_name: &str, err: FlavourError) -> Self {
        match err {
            FlavourError::Rejected(rejection) => EngineError::Rejected {
                command_name: command_name.to_string(),
                rejection,
            },
            FlavourError::MissingIdentifier { key } => EngineError::MissingAggregateIdentifier {
                command_name: command_name.to_string(),
                key,
            },
            other => EngineError::Flavour(other),
        }
    }
}

impl From<FlavourError> for EngineError {
    fn from(err: FlavourError) -> Self {
        EngineError::Flavour(err)
    }
}

impl From<EventStoreError> for EngineError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                stream,
                expected,
                actual,
            } => EngineError::ConcurrencyConflict {
                aggregate_type: stream.aggregate_type,
                aggregate_id: stream.aggregate_id.into_inner(),
                expected,
                actual,
            },
            other => EngineError::EventStore(other),
        }
    }
}

impl From<MessagingError> for EngineError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::SchemaViolation {
                message_name,
                error,
            } => EngineError::SchemaViolation {
                message_name,
                error,
            },
            other => EngineError::Messaging(other),
        }
    }
}

/// Transport-facing error shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(err: EngineError) -> Self {
        Self::from(&err)
    }
}

/// Problems found while building an engine from its descriptions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Command {0} is described more than once")]
    DuplicateCommand(String),

    #[error("Query {0} is described more than once")]
    DuplicateQuery(String),

    #[error("Message {name} must be registered as a {expected} before it is described")]
    UnregisteredMessage { name: String, expected: MessageType },

    #[error("Message {name} is registered as a {actual}, expected a {expected}")]
    WrongMessageType {
        name: String,
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Command {command_name} binds functions of incompatible types: {reason}")]
    IncompatibleTypes { command_name: String, reason: String },

    #[error("Watch capacity must be at least 1")]
    ZeroWatchCapacity,

    #[error("Command {0} has no aggregate type")]
    MissingAggregateType(String),

    #[error("Command {0} has no identity key")]
    MissingIdentityKey(String),

    #[error("Command {0} has no handler")]
    MissingHandler(String),

    #[error("Command {0} binds an apply function before recording any event")]
    ApplyWithoutRecordedEvent(String),

    #[error("Event {event_name} has more than one apply function on aggregate {aggregate_type}")]
    DuplicateApplyFunction {
        aggregate_type: String,
        event_name: String,
    },

    #[error("Event {event_name} has no apply function on aggregate {aggregate_type}")]
    MissingApplyFunction {
        aggregate_type: String,
        event_name: String,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::StreamId;
    use messaging::FieldViolation;

    #[test]
    fn store_conflicts_become_engine_conflicts() {
        let err = EngineError::from(EventStoreError::ConcurrencyConflict {
            stream: StreamId::new("User", "u-1"),
            expected: Version::initial(),
            actual: Version::first(),
        });

        match &err {
            EngineError::ConcurrencyConflict {
                aggregate_type,
                aggregate_id,
                ..
            } => {
                assert_eq!(aggregate_type, "User");
                assert_eq!(aggregate_id, "u-1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), "CONCURRENCY_CONFLICT");
        assert!(err.is_client_error());
    }

    #[test]
    fn schema_violations_keep_field_detail() {
        let err = EngineError::from(MessagingError::SchemaViolation {
            message_name: "RegisterUser".to_string(),
            error: ValidationError::new(vec![FieldViolation::new("username", "is required")]),
        });

        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, "SCHEMA_VIOLATION");
        assert!(response.message.contains("username: is required"));
    }

    #[test]
    fn flavour_rejections_name_the_command() {
        let err = EngineError::from_flavour(
            "ChangeUsername",
            FlavourError::Rejected(Rejection::new("username taken")),
        );
        assert!(matches!(
            &err,
            EngineError::Rejected { command_name, rejection }
                if command_name == "ChangeUsername" && rejection.reason == "username taken"
        ));
        assert_eq!(err.code(), "REJECTED");

        let err = EngineError::from_flavour(
            "ChangeUsername",
            FlavourError::MissingIdentifier {
                key: "userId".to_string(),
            },
        );
        assert_eq!(err.code(), "MISSING_AGGREGATE_IDENTIFIER");
    }

    #[test]
    fn configuration_drift_is_not_a_client_error() {
        let err = EngineError::UnknownEventForApplyMap {
            aggregate_type: "User".to_string(),
            event_name: "UserWasDeleted".to_string(),
        };
        assert!(!err.is_client_error());
        assert_eq!(err.code(), "UNKNOWN_EVENT_FOR_APPLY_MAP");
    }
}
