//! Event stream storage for the engine.
//!
//! A stream is the append-only event log of one aggregate instance,
//! identified by [`StreamId`]. The [`EventStore`] trait is the storage
//! contract; [`InMemoryEventStore`] implements it for tests and embedding.

pub mod error;
pub mod event;
pub mod memory;
pub mod snapshot;
pub mod store;
pub mod stream;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
pub use stream::StreamId;
