//! Recipients of recorded events.

use std::error::Error as StdError;

use async_trait::async_trait;
use messaging::Message;
use thiserror::Error;

/// Failure reported by a subscriber or process manager.
///
/// Failures are collected into the dispatch report; they never undo the
/// append that produced the event.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SubscriberError(Box<dyn StdError + Send + Sync>);

impl SubscriberError {
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// Receives every event after it has been appended.
///
/// Events carry their causation and `_aggregate_*` metadata. Subscribers are
/// called in registration order.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn on_event(&self, event: &Message) -> Result<(), SubscriberError>;
}

/// Reacts to events by issuing follow-up commands.
///
/// Returned commands are dispatched after the current command finishes,
/// with the event as their causation.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    fn name(&self) -> &str;

    async fn react(&self, event: &Message) -> Result<Vec<Message>, SubscriberError>;
}
