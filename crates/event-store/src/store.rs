use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{EventEnvelope, EventStoreError, Result, Snapshot, StreamId, Version};

/// Options for appending events to a stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the stream for optimistic concurrency control.
    /// If None, no version check is performed (use with caution).
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the stream to be empty.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Storage contract for event streams.
///
/// All implementations must be thread-safe (Send + Sync). The only
/// mutual-exclusion requirement is per stream: two appends to the same
/// stream with the same expected version must not both succeed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream.
    ///
    /// Events are appended atomically - either all succeed or none do.
    /// If `options.expected_version` is set, the operation will fail with
    /// `ConcurrencyConflict` if the current version doesn't match.
    ///
    /// Returns the new version of the stream after appending.
    async fn append_to_stream(
        &self,
        stream: &StreamId,
        events: Vec<EventEnvelope>,
        options: AppendOptions,
    ) -> Result<Version>;

    /// Retrieves all events of a stream in version order. Empty if the
    /// stream does not exist.
    async fn load_stream(&self, stream: &StreamId) -> Result<Vec<EventEnvelope>>;

    /// Retrieves the events of a stream starting at `from_version` (inclusive).
    ///
    /// Useful when replaying from a snapshot.
    async fn load_stream_from_version(
        &self,
        stream: &StreamId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams all events in the store in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Gets the current version of a stream.
    ///
    /// Returns None if the stream doesn't exist.
    async fn stream_version(&self, stream: &StreamId) -> Result<Option<Version>>;

    /// Saves a snapshot of an aggregate's state. A snapshot older than the
    /// one already stored is ignored.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for a stream.
    async fn get_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Loads a stream, optionally starting from a snapshot.
    ///
    /// If a snapshot exists, returns the snapshot and events after it.
    /// Otherwise, returns None and all events.
    async fn load_with_snapshot(
        &self,
        stream: &StreamId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(stream).await? {
            let events = self
                .load_stream_from_version(stream, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.load_stream(stream).await?;
            Ok((None, events))
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates a batch before it is appended to `stream`.
///
/// The batch must be non-empty, belong entirely to `stream`, and carry
/// consecutive versions.
pub fn validate_events_for_append(stream: &StreamId, events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    if let Some(foreign) = events.iter().find(|e| !e.belongs_to(stream)) {
        return Err(EventStoreError::InvalidAppend(format!(
            "event {} belongs to stream {}, not {}",
            foreign.event_id,
            foreign.stream_id(),
            stream
        )));
    }

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}
