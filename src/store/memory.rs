//! The default `Store` backend: an in-process map behind a lock.
//!
//! Grounded on `InMemoryVectorStore` from the teacher's `db/vectorstore.rs`
//! (`parking_lot::RwLock<HashMap<...>>`, cosine similarity, the
//! create/upsert/search/delete shape) generalized to this spec's `Document`
//! metadata, filtering, and isolation-mode semantics.

use super::{
    collection_not_found, sort_results, CollectionInfo, Document, Filter, IsolationMode, SearchResult,
    Store,
};
use crate::embed::Embedder;
use crate::error::Result;
use crate::value::DynValue;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

struct StoredPoint {
    content: String,
    vector: Vec<f32>,
    metadata: HashMap<String, DynValue>,
}

struct Collection {
    vector_size: usize,
    points: HashMap<String, StoredPoint>,
    /// Insertion order, used to break score ties deterministically by id
    /// rather than by map iteration order.
    insertion_order: Vec<String>,
}

/// The default backend: zero external dependencies, used for tests and for
/// running the daemon out of the box.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    embedder: Arc<dyn Embedder>,
    isolation_mode: AtomicU8,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embedder,
            isolation_mode: AtomicU8::new(IsolationMode::default() as u8),
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// In `IsolationMode::None` the store trusts collection naming alone and
    /// drops any tenant terms the caller's filter carried — a defence that
    /// is explicitly switched off. In `Payload` mode (the production
    /// default) the caller's filter, tenant terms included, is enforced
    /// as-is.
    fn apply_isolation(mode: IsolationMode, filter: Filter) -> Filter {
        const TENANT_FIELDS: [&str; 3] = ["tenant_id", "team_id", "project_id"];
        if mode == IsolationMode::Payload {
            return filter;
        }
        Filter {
            must: filter
                .must
                .into_iter()
                .filter(|term| !TENANT_FIELDS.contains(&term.field.as_str()))
                .collect(),
            should: filter.should,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()> {
        let mut collections = self.collections.write();
        collections.entry(name.to_string()).or_insert_with(|| Collection {
            vector_size: if vector_size == 0 {
                self.embedder.dimensions()
            } else {
                vector_size
            },
            points: HashMap::new(),
            insertion_order: Vec::new(),
        });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn get_collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read();
        let collection = collections.get(name).ok_or_else(|| collection_not_found(name))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            point_count: collection.points.len(),
            vector_size: collection.vector_size,
        })
    }

    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(documents.len());
        for doc in documents {
            let vector = self.embedder.embed(&doc.content).await?;
            let id = doc.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let mut collections = self.collections.write();
            let collection = collections
                .entry(doc.collection.clone())
                .or_insert_with(|| Collection {
                    vector_size: vector.len(),
                    points: HashMap::new(),
                    insertion_order: Vec::new(),
                });
            if !collection.points.contains_key(&id) {
                collection.insertion_order.push(id.clone());
            }
            collection.points.insert(
                id.clone(),
                StoredPoint {
                    content: doc.content,
                    vector,
                    metadata: doc.metadata,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Filter,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embedder.embed(query).await?;
        let collections = self.collections.read();
        let Some(collection) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let filter = Self::apply_isolation(self.isolation_mode(), filter);
        let mut results: Vec<SearchResult> = collection
            .insertion_order
            .iter()
            .filter_map(|id| collection.points.get(id).map(|point| (id, point)))
            .filter(|(_, point)| filter.matches(&point.metadata))
            .map(|(id, point)| SearchResult {
                id: id.clone(),
                content: point.content.clone(),
                score: Self::cosine_similarity(&query_vector, &point.vector),
                metadata: point.metadata.clone(),
            })
            .collect();

        sort_results(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn exact_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Filter,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read();
        let Some(collection) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let filter = Self::apply_isolation(self.isolation_mode(), filter);
        let mut results: Vec<SearchResult> = collection
            .insertion_order
            .iter()
            .filter_map(|id| collection.points.get(id).map(|point| (id, point)))
            .filter(|(_, point)| point.content == query)
            .filter(|(_, point)| filter.matches(&point.metadata))
            .map(|(id, point)| SearchResult {
                id: id.clone(),
                content: point.content.clone(),
                score: 1.0,
                metadata: point.metadata.clone(),
            })
            .collect();

        sort_results(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn delete_documents_from_collection(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(collection) = collections.get_mut(collection) {
            for id in ids {
                collection.points.remove(id);
                collection.insertion_order.retain(|existing| existing != id);
            }
        }
        Ok(())
    }

    fn set_isolation_mode(&self, mode: IsolationMode) {
        self.isolation_mode.store(mode as u8, Ordering::SeqCst);
    }

    fn isolation_mode(&self) -> IsolationMode {
        match self.isolation_mode.load(Ordering::SeqCst) {
            0 => IsolationMode::None,
            _ => IsolationMode::Payload,
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(HashEmbedder::new(32)))
    }

    fn doc(collection: &str, content: &str) -> Document {
        Document {
            id: None,
            content: content.to_string(),
            metadata: HashMap::new(),
            collection: collection.to_string(),
        }
    }

    #[tokio::test]
    async fn create_collection_is_idempotent() {
        let store = store();
        store.create_collection("docs", 32).await.unwrap();
        store.create_collection("docs", 32).await.unwrap();
        let info = store.get_collection_info("docs").await.unwrap();
        assert_eq!(info.point_count, 0);
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_empty_not_error() {
        let store = store();
        let results = store.search("nope", "query", 5, Filter::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn add_then_search_finds_document() {
        let store = store();
        store.add_documents(vec![doc("docs", "connection refused")]).await.unwrap();
        let results = store
            .search("docs", "connection refused", 5, Filter::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "connection refused");
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = store();
        let ids = store.add_documents(vec![doc("docs", "x")]).await.unwrap();
        store.delete_documents_from_collection("docs", &ids).await.unwrap();
        let results = store.search("docs", "x", 5, Filter::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_metadata() {
        let store = store();
        let mut d = doc("docs", "error in module a");
        d.metadata.insert("project_path".into(), DynValue::from("/p/a"));
        store.add_documents(vec![d]).await.unwrap();

        let mut d2 = doc("docs", "error in module b");
        d2.metadata.insert("project_path".into(), DynValue::from("/p/b"));
        store.add_documents(vec![d2]).await.unwrap();

        let filter = Filter::new().with_must("project_path", "/p/a");
        let results = store.search("docs", "error", 10, filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].metadata.get("project_path"),
            Some(&DynValue::from("/p/a"))
        );
    }

    #[tokio::test]
    async fn payload_isolation_enforces_callers_tenant_filter() {
        let store = store();
        store.set_isolation_mode(IsolationMode::Payload);

        let mut mine = doc("shared", "same text");
        mine.metadata.insert("tenant_id".into(), DynValue::from("acme"));
        store.add_documents(vec![mine]).await.unwrap();

        let mut theirs = doc("shared", "same text");
        theirs.metadata.insert("tenant_id".into(), DynValue::from("other"));
        store.add_documents(vec![theirs]).await.unwrap();

        let filter = Filter::new().with_must("tenant_id", "acme");
        let results = store.search("shared", "same text", 10, filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.get("tenant_id"), Some(&DynValue::from("acme")));
    }

    #[tokio::test]
    async fn none_isolation_drops_tenant_filter_terms() {
        let store = store();
        store.set_isolation_mode(IsolationMode::None);

        let mut mine = doc("shared", "same text");
        mine.metadata.insert("tenant_id".into(), DynValue::from("acme"));
        store.add_documents(vec![mine]).await.unwrap();

        let mut theirs = doc("shared", "same text");
        theirs.metadata.insert("tenant_id".into(), DynValue::from("other"));
        store.add_documents(vec![theirs]).await.unwrap();

        let filter = Filter::new().with_must("tenant_id", "acme");
        let results = store.search("shared", "same text", 10, filter).await.unwrap();
        assert_eq!(results.len(), 2, "none mode trusts collection naming, not payload filtering");
    }

    #[tokio::test]
    async fn exact_search_matches_literal_content_only() {
        let store = store();
        store.add_documents(vec![doc("docs", "exact phrase")]).await.unwrap();
        store.add_documents(vec![doc("docs", "exact phrase plus more")]).await.unwrap();

        let results = store
            .exact_search("docs", "exact phrase", 10, Filter::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "exact phrase");
    }
}
