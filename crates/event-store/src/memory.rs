use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventEnvelope, EventStoreError, Result, Snapshot, StreamId, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

/// In-memory event store.
///
/// Events are kept in one insertion-ordered log; appends take the write lock
/// for the whole version check and insert, which makes them atomic per
/// stream.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    snapshots: Arc<RwLock<HashMap<StreamId, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns the number of stored snapshots.
    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        self.events.write().await.clear();
        self.snapshots.write().await.clear();
    }
}

fn current_version(events: &[EventEnvelope], stream: &StreamId) -> Option<Version> {
    events
        .iter()
        .filter(|e| e.belongs_to(stream))
        .map(|e| e.version)
        .max()
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_to_stream(
        &self,
        stream: &StreamId,
        events: Vec<EventEnvelope>,
        options: AppendOptions,
    ) -> Result<Version> {
        validate_events_for_append(stream, &events)?;

        let mut store = self.events.write().await;
        let current = current_version(&store, stream).unwrap_or_default();

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                stream: stream.clone(),
                expected,
                actual: current,
            });
        }

        // Unique (stream, version) constraint
        if events[0].version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                stream: stream.clone(),
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        let last_version = current.advance(events.len());
        store.extend(events);
        tracing::trace!(%stream, version = %last_version, "events appended");

        Ok(last_version)
    }

    async fn load_stream(&self, stream: &StreamId) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.belongs_to(stream))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn load_stream_from_version(
        &self,
        stream: &StreamId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.belongs_to(stream) && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.events.read().await.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn stream_version(&self, stream: &StreamId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        Ok(current_version(&store, stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        let stream = snapshot.stream_id();
        if let Some(current) = snapshots.get(&stream)
            && current.version > snapshot.version
        {
            tracing::trace!(%stream, kept = %current.version, "older snapshot ignored");
            return Ok(());
        }
        snapshots.insert(stream, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(stream).cloned())
    }
}
