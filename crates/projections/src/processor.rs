//! Feeds stored and live events to projections.

use std::sync::Arc;

use async_trait::async_trait;
use engine::{EventSubscriber, SubscriberError, message_from_envelope};
use event_store::EventStore;
use futures_util::StreamExt;
use messaging::{Message, meta};

use crate::Result;
use crate::projection::Projection;

/// Delivers events to a set of projections.
///
/// - Catch-up replays the whole store, skipping events a projection has
///   already counted in its position
/// - Live delivery happens through [`EventSubscriber`], so the processor can be
///   subscribed to an engine directly
/// - Rebuild resets every projection and catches up from scratch
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Arc<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Builder-style [`ProjectionProcessor::register`].
    pub fn with(mut self, projection: Arc<dyn Projection>) -> Self {
        self.register(projection);
        self
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams every stored event and hands each projection the ones beyond
    /// its position.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = message_from_envelope(&result?)?;
            event_index += 1;

            for projection in &self.projections {
                if !projection.position().await.has_seen(event_index) {
                    projection.handle(&event).await?;
                    metrics::counter!("projections_events_processed").increment(1);
                }
            }
        }

        tracing::info!(events_processed = event_index, "catch-up complete");
        Ok(())
    }

    /// Delivers one event to every projection.
    #[tracing::instrument(skip(self, event), fields(event_name = %event.name()))]
    pub async fn process_event(&self, event: &Message) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
            metrics::counter!("projections_events_processed").increment(1);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[async_trait]
impl<S: EventStore> EventSubscriber for ProjectionProcessor<S> {
    fn name(&self) -> &str {
        "projections"
    }

    /// Events published without a stream are not part of the store's log,
    /// so counting them would misalign positions with catch-up.
    async fn on_event(&self, event: &Message) -> std::result::Result<(), SubscriberError> {
        if event.metadata_value(meta::AGGREGATE_VERSION).is_none() {
            tracing::trace!(event_name = event.name(), "skipping event without stream");
            return Ok(());
        }
        self.process_event(event).await.map_err(SubscriberError::new)
    }
}
