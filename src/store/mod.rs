//! The vector store abstraction (§4.2).
//!
//! `Store` is the uniform capability set every knowledge service calls
//! through. Collections are created lazily, documents are embedded on the
//! way in, and every search applies the caller's filters plus whatever the
//! active [`IsolationMode`] mandates. A missing collection on search returns
//! an empty result set rather than an error, so services can treat
//! first-use lazily without a separate "does this collection exist yet"
//! round-trip.

mod grpc;
mod memory;

#[cfg(feature = "local-vector")]
mod local;

pub use grpc::{GrpcStore, VectorBackendClient};
pub use memory::InMemoryStore;

#[cfg(feature = "local-vector")]
pub use local::LocalStore;

use crate::error::{ContextdError, Result};
use crate::value::DynValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single filter term: `field` must equal `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub field: String,
    pub value: DynValue,
}

/// A filter applied to a search: every `must` term is an AND; every
/// `should` term is an OR (at least one must match when non-empty).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub must: Vec<FilterTerm>,
    pub should: Vec<FilterTerm>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_must(mut self, field: impl Into<String>, value: impl Into<DynValue>) -> Self {
        self.must.push(FilterTerm {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_should(mut self, field: impl Into<String>, value: impl Into<DynValue>) -> Self {
        self.should.push(FilterTerm {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    fn matches(&self, metadata: &HashMap<String, DynValue>) -> bool {
        for term in &self.must {
            if metadata.get(&term.field) != Some(&term.value) {
                return false;
            }
        }
        if !self.should.is_empty() {
            return self
                .should
                .iter()
                .any(|term| metadata.get(&term.field) == Some(&term.value));
        }
        true
    }
}

/// A document to be embedded and upserted into a collection.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Option<String>,
    pub content: String,
    pub metadata: HashMap<String, DynValue>,
    pub collection: String,
}

/// A single search hit, ordered by `score` descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub metadata: HashMap<String, DynValue>,
}

/// Summary information about a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub point_count: usize,
    pub vector_size: usize,
}

/// Whether the store appends a mandatory tenant filter to every search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// Trust collection naming only.
    None,
    /// Append an implicit `must tenant_id == …` filter derived from the
    /// collection's own tenant metadata. Production default.
    #[default]
    Payload,
}

/// The uniform capability set every knowledge service calls through.
///
/// Implementations must be safe for concurrent use — internally an adapter
/// typically holds a single connection pool or a single lock-guarded map.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create `name` with the given vector dimensionality (0 = backend
    /// default). Idempotent: a second call with the same name succeeds and
    /// leaves point count unchanged.
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn get_collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// Embed each document's content, merge tenant metadata, and upsert with
    /// a stable id (assigning a fresh UUID when absent). Returns the ids
    /// assigned, in input order.
    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>>;

    /// Search `collection` for the `k` nearest neighbours of `query`,
    /// applying `filter` and the store's isolation-mode tenant filter.
    /// Missing collection returns an empty list, not an error.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Filter,
    ) -> Result<Vec<SearchResult>>;

    /// Exact-match search: finds the document(s) whose content equals
    /// `query` literally, still subject to `filter`/isolation. Used for
    /// id-lookup style reads that don't want semantic fuzziness.
    async fn exact_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Filter,
    ) -> Result<Vec<SearchResult>>;

    async fn delete_documents_from_collection(&self, collection: &str, ids: &[String]) -> Result<()>;

    fn set_isolation_mode(&self, mode: IsolationMode);

    fn isolation_mode(&self) -> IsolationMode;

    async fn close(&self) -> Result<()>;
}

/// Monotonic ties-broken-by-id ordering used by every `Store` implementation
/// when sorting hits: score descending, id ascending on ties.
pub(crate) fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn collection_not_found(name: &str) -> ContextdError {
    ContextdError::NotFound(format!("collection '{name}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_must_requires_every_term() {
        let mut metadata = HashMap::new();
        metadata.insert("tenant_id".to_string(), DynValue::String("acme".into()));
        let filter = Filter::new()
            .with_must("tenant_id", "acme")
            .with_must("team_id", "core");
        assert!(!filter.matches(&metadata));

        metadata.insert("team_id".to_string(), DynValue::String("core".into()));
        assert!(filter.matches(&metadata));
    }

    #[test]
    fn filter_should_requires_at_least_one_match() {
        let mut metadata = HashMap::new();
        metadata.insert("category".to_string(), DynValue::String("network".into()));
        let filter = Filter::new()
            .with_should("category", "network")
            .with_should("category", "disk");
        assert!(filter.matches(&metadata));

        let filter = Filter::new().with_should("category", "disk");
        assert!(!filter.matches(&metadata));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let metadata = HashMap::new();
        assert!(Filter::new().matches(&metadata));
    }

    #[test]
    fn invariant_4_sort_results_is_score_desc_id_asc() {
        let mut results = vec![
            SearchResult {
                id: "b".into(),
                content: String::new(),
                score: 0.5,
                metadata: HashMap::new(),
            },
            SearchResult {
                id: "a".into(),
                content: String::new(),
                score: 0.5,
                metadata: HashMap::new(),
            },
            SearchResult {
                id: "c".into(),
                content: String::new(),
                score: 0.9,
                metadata: HashMap::new(),
            },
        ];
        sort_results(&mut results);
        assert_eq!(results[0].id, "c");
        assert_eq!(results[1].id, "a");
        assert_eq!(results[2].id, "b");
    }
}
