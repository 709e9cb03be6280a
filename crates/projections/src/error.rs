//! Projection error types.

use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored event could not be turned back into a message.
    #[error("Event conversion error: {0}")]
    Conversion(#[from] engine::EngineError),

    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `update_doc` targeted a document that does not exist.
    #[error("Document {id} not found in {collection}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Document {id} already exists in {collection}")]
    DocumentExists { collection: String, id: String },

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
