//! Document storage for read models.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::{ProjectionError, Result};

/// A read-model document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Storage contract for read-model documents, grouped into collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document; fails with `DocumentExists` if the id is taken.
    async fn add_doc(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Merges `changes` into an existing document, field by field.
    async fn update_doc(&self, collection: &str, id: &str, changes: Document) -> Result<()>;

    /// Inserts or replaces a document.
    async fn upsert_doc(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Removes a document. Returns false if it did not exist.
    async fn delete_doc(&self, collection: &str, id: &str) -> Result<bool>;

    async fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Returns the documents whose top-level fields equal every field in
    /// `filter`, ordered by id.
    async fn find_docs(&self, collection: &str, filter: &Document) -> Result<Vec<Document>>;

    /// Removes a collection with all its documents.
    async fn drop_collection(&self, collection: &str) -> Result<()>;
}

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// In-memory document store.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add_doc(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(ProjectionError::DocumentExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(id.to_string(), doc);
        Ok(())
    }

    async fn update_doc(&self, collection: &str, id: &str, changes: Document) -> Result<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| ProjectionError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        doc.extend(changes);
        Ok(())
    }

    async fn upsert_doc(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn find_docs(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().await.remove(collection);
        tracing::debug!(collection, "collection dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn add_rejects_duplicates() {
        let store = InMemoryDocumentStore::new();
        store
            .add_doc("users", "u-1", doc(json!({"username": "John"})))
            .await
            .unwrap();

        let err = store
            .add_doc("users", "u-1", doc(json!({"username": "Max"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::DocumentExists { .. }));
        assert_eq!(
            store.get_doc("users", "u-1").await.unwrap(),
            Some(doc(json!({"username": "John"})))
        );
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = InMemoryDocumentStore::new();
        store
            .add_doc(
                "users",
                "u-1",
                doc(json!({"username": "John", "email": "john@example.com"})),
            )
            .await
            .unwrap();

        store
            .update_doc("users", "u-1", doc(json!({"username": "Max"})))
            .await
            .unwrap();

        assert_eq!(
            store.get_doc("users", "u-1").await.unwrap(),
            Some(doc(json!({"username": "Max", "email": "john@example.com"})))
        );
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update_doc("users", "ghost", Document::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn find_filters_on_equal_fields() {
        let store = InMemoryDocumentStore::new();
        for (id, role) in [("u-1", "admin"), ("u-2", "member"), ("u-3", "admin")] {
            store
                .upsert_doc("users", id, doc(json!({"id": id, "role": role})))
                .await
                .unwrap();
        }

        let admins = store
            .find_docs("users", &doc(json!({"role": "admin"})))
            .await
            .unwrap();
        let ids: Vec<_> = admins.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!("u-1"), json!("u-3")]);

        let all = store.find_docs("users", &Document::new()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(store.find_docs("orders", &Document::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_and_drop() {
        let store = InMemoryDocumentStore::new();
        store
            .upsert_doc("users", "u-1", Document::new())
            .await
            .unwrap();
        store
            .upsert_doc("users", "u-2", Document::new())
            .await
            .unwrap();

        assert!(store.delete_doc("users", "u-1").await.unwrap());
        assert!(!store.delete_doc("users", "u-1").await.unwrap());
        assert_eq!(store.count("users").await, 1);

        store.drop_collection("users").await.unwrap();
        assert_eq!(store.count("users").await, 0);
    }
}
