//! The projection contract and log offsets.

use std::fmt;

use async_trait::async_trait;
use messaging::Message;

use crate::Result;

/// How far into the store's global log a projection has read.
///
/// An offset of `n` means the first `n` stored events were handed to the
/// projection. Published events never enter the log, so they never move it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition {
    pub offset: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether the event at `log_index` (1-based) was already handled.
    pub fn has_seen(&self, log_index: u64) -> bool {
        log_index <= self.offset
    }

    pub fn advance(self) -> Self {
        Self {
            offset: self.offset + 1,
        }
    }
}

impl fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.offset)
    }
}

/// A read model fed from stored events.
///
/// Every stored event is handed to every projection in log order, including
/// events the projection ignores; those still advance the offset.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &Message) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Clears the read model and rewinds to offset zero.
    async fn reset(&self) -> Result<()>;
}
