//! Remote `Store` backend: talks to an out-of-process vector service over a
//! pluggable client trait, with retry/backoff on transient failures.
//!
//! Grounded on the teacher's `db/qdrant.rs` client-wrapper shape (a thin
//! adapter around a generated gRPC client, status-code-driven error mapping)
//! generalized to a trait so tests exercise the retry/backoff logic without
//! a network dependency — only a loopback implementation ships here; a real
//! tonic-generated client is an integration detail for deployments that pick
//! the `grpc` backend.

use super::{sort_results, CollectionInfo, Document, Filter, IsolationMode, SearchResult, Store};
use crate::error::{ContextdError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Status codes a remote vector backend can report, independent of any
/// specific RPC framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Ok,
    NotFound,
    AlreadyExists,
    Unavailable,
    DeadlineExceeded,
    Aborted,
    ResourceExhausted,
    Other,
}

impl BackendStatus {
    fn is_transient(self) -> bool {
        matches!(
            self,
            BackendStatus::Unavailable
                | BackendStatus::DeadlineExceeded
                | BackendStatus::Aborted
                | BackendStatus::ResourceExhausted
        )
    }
}

/// A backend RPC response: either a value or a status describing the failure.
pub struct BackendResponse<T> {
    pub status: BackendStatus,
    pub value: Option<T>,
    pub message: String,
}

impl<T> BackendResponse<T> {
    pub fn ok(value: T) -> Self {
        Self {
            status: BackendStatus::Ok,
            value: Some(value),
            message: String::new(),
        }
    }

    pub fn err(status: BackendStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            value: None,
            message: message.into(),
        }
    }
}

/// The wire contract `GrpcStore` drives. A real deployment implements this
/// against a generated gRPC client; tests and local loopback runs use
/// [`LoopbackClient`], which forwards to an in-process `Store`.
#[async_trait]
pub trait VectorBackendClient: Send + Sync {
    async fn create_collection(&self, name: &str, vector_size: usize) -> BackendResponse<()>;
    async fn delete_collection(&self, name: &str) -> BackendResponse<()>;
    async fn collection_exists(&self, name: &str) -> BackendResponse<bool>;
    async fn list_collections(&self) -> BackendResponse<Vec<String>>;
    async fn get_collection_info(&self, name: &str) -> BackendResponse<CollectionInfo>;
    async fn add_documents(&self, documents: Vec<Document>) -> BackendResponse<Vec<String>>;
    async fn search(&self, collection: &str, query: &str, k: usize, filter: Filter) -> BackendResponse<Vec<SearchResult>>;
    async fn exact_search(&self, collection: &str, query: &str, k: usize, filter: Filter) -> BackendResponse<Vec<SearchResult>>;
    async fn delete_documents(&self, collection: &str, ids: &[String]) -> BackendResponse<()>;
}

/// Forwards every call straight to an in-process [`Store`], used to exercise
/// `GrpcStore`'s retry/backoff and status mapping without a real network
/// dependency.
pub struct LoopbackClient<S: Store> {
    inner: S,
    /// Forces the next `attempts_to_fail` calls to return a transient error
    /// before succeeding, for retry tests.
    fail_remaining: std::sync::atomic::AtomicUsize,
}

impl<S: Store> LoopbackClient<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_remaining: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn fail_next(self, attempts: usize) -> Self {
        self.fail_remaining.store(attempts, Ordering::SeqCst);
        self
    }

    fn take_forced_failure(&self) -> bool {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            return false;
        }
        self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
        true
    }
}

#[async_trait]
impl<S: Store> VectorBackendClient for LoopbackClient<S> {
    async fn create_collection(&self, name: &str, vector_size: usize) -> BackendResponse<()> {
        if self.take_forced_failure() {
            return BackendResponse::err(BackendStatus::Unavailable, "forced failure");
        }
        match self.inner.create_collection(name, vector_size).await {
            Ok(()) => BackendResponse::ok(()),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn delete_collection(&self, name: &str) -> BackendResponse<()> {
        match self.inner.delete_collection(name).await {
            Ok(()) => BackendResponse::ok(()),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn collection_exists(&self, name: &str) -> BackendResponse<bool> {
        match self.inner.collection_exists(name).await {
            Ok(exists) => BackendResponse::ok(exists),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn list_collections(&self) -> BackendResponse<Vec<String>> {
        match self.inner.list_collections().await {
            Ok(names) => BackendResponse::ok(names),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn get_collection_info(&self, name: &str) -> BackendResponse<CollectionInfo> {
        match self.inner.get_collection_info(name).await {
            Ok(info) => BackendResponse::ok(info),
            Err(ContextdError::NotFound(msg)) => BackendResponse::err(BackendStatus::NotFound, msg),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn add_documents(&self, documents: Vec<Document>) -> BackendResponse<Vec<String>> {
        if self.take_forced_failure() {
            return BackendResponse::err(BackendStatus::Unavailable, "forced failure");
        }
        match self.inner.add_documents(documents).await {
            Ok(ids) => BackendResponse::ok(ids),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn search(&self, collection: &str, query: &str, k: usize, filter: Filter) -> BackendResponse<Vec<SearchResult>> {
        if self.take_forced_failure() {
            return BackendResponse::err(BackendStatus::DeadlineExceeded, "forced failure");
        }
        match self.inner.search(collection, query, k, filter).await {
            Ok(results) => BackendResponse::ok(results),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn exact_search(&self, collection: &str, query: &str, k: usize, filter: Filter) -> BackendResponse<Vec<SearchResult>> {
        match self.inner.exact_search(collection, query, k, filter).await {
            Ok(results) => BackendResponse::ok(results),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }

    async fn delete_documents(&self, collection: &str, ids: &[String]) -> BackendResponse<()> {
        match self.inner.delete_documents_from_collection(collection, ids).await {
            Ok(()) => BackendResponse::ok(()),
            Err(e) => BackendResponse::err(BackendStatus::Other, e.to_string()),
        }
    }
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

async fn with_retry<T, F, Fut>(op_name: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = BackendResponse<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let response = call().await;
        match response.status {
            BackendStatus::Ok => {
                return response
                    .value
                    .ok_or_else(|| ContextdError::Backend(format!("{op_name}: backend reported ok with no value")));
            }
            BackendStatus::NotFound => {
                return Err(ContextdError::NotFound(response.message));
            }
            status if status.is_transient() && attempt < MAX_ATTEMPTS => {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                tracing::warn!(op = op_name, attempt, status = ?status, "transient backend error, retrying");
                tokio::time::sleep(backoff).await;
            }
            _ => {
                return Err(ContextdError::Backend(format!(
                    "{op_name} failed after {attempt} attempt(s): {}",
                    response.message
                )));
            }
        }
    }
}

/// `Store` implementation that drives a [`VectorBackendClient`] with
/// retry/backoff on transient errors (base 1s, doubling, 3 attempts).
pub struct GrpcStore<C: VectorBackendClient> {
    client: C,
    isolation_mode: AtomicU8,
}

impl<C: VectorBackendClient> GrpcStore<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            isolation_mode: AtomicU8::new(IsolationMode::default() as u8),
        }
    }
}

#[async_trait]
impl<C: VectorBackendClient> Store for GrpcStore<C> {
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()> {
        with_retry("create_collection", || async {
            let response = self.client.create_collection(name, vector_size).await;
            if response.status == BackendStatus::AlreadyExists {
                BackendResponse::ok(())
            } else {
                response
            }
        })
        .await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        with_retry("delete_collection", || self.client.delete_collection(name)).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        with_retry("collection_exists", || self.client.collection_exists(name)).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        with_retry("list_collections", || self.client.list_collections()).await
    }

    async fn get_collection_info(&self, name: &str) -> Result<CollectionInfo> {
        with_retry("get_collection_info", || self.client.get_collection_info(name)).await
    }

    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>> {
        with_retry("add_documents", || self.client.add_documents(documents.clone())).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Filter,
    ) -> Result<Vec<SearchResult>> {
        let result = with_retry("search", || self.client.search(collection, query, k, filter.clone())).await;
        match result {
            Err(ContextdError::NotFound(_)) => Ok(Vec::new()),
            other => {
                let mut results = other?;
                sort_results(&mut results);
                Ok(results)
            }
        }
    }

    async fn exact_search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Filter,
    ) -> Result<Vec<SearchResult>> {
        let result = with_retry("exact_search", || self.client.exact_search(collection, query, k, filter.clone())).await;
        match result {
            Err(ContextdError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn delete_documents_from_collection(&self, collection: &str, ids: &[String]) -> Result<()> {
        with_retry("delete_documents", || self.client.delete_documents(collection, ids)).await
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
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn backed_store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(HashEmbedder::new(32)))
    }

    #[tokio::test]
    async fn create_collection_retries_through_transient_failure() {
        let client = LoopbackClient::new(backed_store()).fail_next(1);
        let store = GrpcStore::new(client);
        store.create_collection("docs", 32).await.unwrap();
        assert!(store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_empty_not_error() {
        let client = LoopbackClient::new(backed_store());
        let store = GrpcStore::new(client);
        let results = store.search("nope", "q", 5, Filter::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn add_then_search_round_trips_through_loopback() {
        let client = LoopbackClient::new(backed_store());
        let store = GrpcStore::new(client);
        let doc = Document {
            id: None,
            content: "disk full".to_string(),
            metadata: Default::default(),
            collection: "docs".to_string(),
        };
        store.add_documents(vec![doc]).await.unwrap();
        let results = store.search("docs", "disk full", 5, Filter::new()).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
