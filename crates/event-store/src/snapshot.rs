use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, StreamId, Version};

/// A snapshot of an aggregate's state at a specific version.
///
/// Snapshots give replay a starting point, avoiding the need to fold all
/// events from the beginning. A store keeps at most one per stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The aggregate this snapshot belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "User").
    pub aggregate_type: String,

    /// The version of the aggregate at the time of the snapshot.
    pub version: Version,

    /// When the snapshot was created.
    pub timestamp: DateTime<Utc>,

    /// The serialized aggregate state.
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Creates a new snapshot.
    pub fn new(stream: StreamId, version: Version, state: serde_json::Value) -> Self {
        Self {
            aggregate_id: stream.aggregate_id,
            aggregate_type: stream.aggregate_type,
            version,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Creates a snapshot from a serializable state.
    pub fn from_state<T: Serialize>(
        stream: StreamId,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(stream, version, serde_json::to_value(state)?))
    }

    /// Returns the stream this snapshot was taken from.
    pub fn stream_id(&self) -> StreamId {
        StreamId::new(self.aggregate_type.clone(), self.aggregate_id.clone())
    }

    /// Deserializes the snapshot state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }

    /// Gets a reference to the state as JSON.
    pub fn state_ref(&self) -> &serde_json::Value {
        &self.state
    }
}
