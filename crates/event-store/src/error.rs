use thiserror::Error;

use crate::{StreamId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A concurrency conflict occurred when appending events.
    /// The expected version did not match the actual version.
    #[error("Concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        stream: StreamId,
        expected: Version,
        actual: Version,
    },

    /// The batch handed to an append was malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// An envelope builder was missing a required field.
    #[error("Event envelope field {0} is required")]
    IncompleteEnvelope(&'static str),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
