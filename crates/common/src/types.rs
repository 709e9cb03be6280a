use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered message payload. Key order is preserved as received.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Message metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Identifier of an aggregate instance.
///
/// Identities are extracted from command payloads, so they are kept as
/// strings. [`AggregateId::new`] produces a random UUID-based identity for
/// callers that mint their own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<String> for AggregateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AggregateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
