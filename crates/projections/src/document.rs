//! Projection that keeps one document collection in sync with events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use messaging::Message;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document_store::{Document, DocumentStore};
use crate::projection::{Projection, ProjectionPosition};
use crate::Result;

/// What an event does to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    /// Inserts or replaces the whole document.
    Upsert { id: String, doc: Document },
    /// Merges fields into an existing document.
    Merge { id: String, changes: Document },
    Delete { id: String },
}

impl DocumentChange {
    pub fn id(&self) -> &str {
        match self {
            DocumentChange::Upsert { id, .. }
            | DocumentChange::Merge { id, .. }
            | DocumentChange::Delete { id } => id,
        }
    }
}

type ChangeFn = dyn Fn(&Message) -> Option<DocumentChange> + Send + Sync;

/// Maps event names to [`DocumentChange`]s in a single collection.
///
/// ```ignore
/// let users = DocumentProjection::new("user-list", "users", store)
///     .on("UserWasRegistered", |event| {
///         let id = event.get("userId")?.as_str()?.to_string();
///         Some(DocumentChange::Upsert { id, doc: event.payload().clone() })
///     });
/// ```
pub struct DocumentProjection<D: DocumentStore> {
    name: String,
    collection: String,
    store: D,
    changes: HashMap<String, Arc<ChangeFn>>,
    position: RwLock<ProjectionPosition>,
}

impl<D: DocumentStore> DocumentProjection<D> {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, store: D) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            store,
            changes: HashMap::new(),
            position: RwLock::new(ProjectionPosition::zero()),
        }
    }

    /// Registers the change an event causes. Returning `None` skips the event.
    pub fn on<F>(mut self, event_name: impl Into<String>, change: F) -> Self
    where
        F: Fn(&Message) -> Option<DocumentChange> + Send + Sync + 'static,
    {
        self.changes.insert(event_name.into(), Arc::new(change));
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    async fn apply(&self, change: DocumentChange) -> Result<()> {
        match change {
            DocumentChange::Upsert { id, doc } => {
                self.store.upsert_doc(&self.collection, &id, doc).await
            }
            DocumentChange::Merge { id, changes } => {
                self.store.update_doc(&self.collection, &id, changes).await
            }
            DocumentChange::Delete { id } => {
                self.store.delete_doc(&self.collection, &id).await?;
                Ok(())
            }
        }
    }
}

/// Reads a string field of an event, the usual document id.
pub fn string_field(event: &Message, key: &str) -> Option<String> {
    event.get(key).and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl<D: DocumentStore> Projection for DocumentProjection<D> {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, event), fields(projection = %self.name, event_name = %event.name()))]
    async fn handle(&self, event: &Message) -> Result<()> {
        if let Some(change) = self.changes.get(event.name()).and_then(|f| f(event)) {
            tracing::debug!(id = change.id(), "updating document");
            self.apply(change).await?;
        }
        let mut position = self.position.write().await;
        *position = position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.store.drop_collection(&self.collection).await?;
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}
