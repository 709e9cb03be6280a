//! Read models fed by engine events.
//!
//! - [`Projection`] turns events into a read model and tracks its position
//! - [`ProjectionProcessor`] catches projections up from the event store and
//!   receives live events as an engine subscriber
//! - [`DocumentStore`] is where read models keep their documents, with an
//!   in-memory implementation
//! - [`DocumentProjection`] maps event names to document changes

pub mod document;
pub mod document_store;
pub mod error;
pub mod processor;
pub mod projection;

pub use document::{DocumentChange, DocumentProjection, string_field};
pub use document_store::{Document, DocumentStore, InMemoryDocumentStore};
pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
