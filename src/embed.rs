//! The embedder interface (§4.5).
//!
//! `Embedder` is deliberately opaque: a `Store` backend asks it to turn text
//! into a fixed-width vector and never inspects how. Dimension is fixed per
//! process and must equal the collection's configured vector size.

use crate::error::{ContextdError, Result};
use async_trait::async_trait;
use std::hash::Hasher;

/// Text → fixed-width float vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. The default implementation embeds
    /// sequentially; providers with real batching should override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The fixed dimensionality this embedder produces.
    fn dimensions(&self) -> usize;
}

/// Deterministic, dependency-free embedder used by default and by every
/// test: hashes overlapping word shingles into `dimensions` buckets, then
/// L2-normalizes. Not semantically meaningful, but stable, fast, and
/// sufficient to exercise every code path above it (ranking, filtering,
/// isolation) without a real model.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(ContextdError::Embed("embedder dimensions must be > 0".into()));
        }
        let mut vector = vec![0f32; self.dimensions];
        for token in text.split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            hasher.write(token.as_bytes());
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Local ONNX-model embedder backed by `fastembed`, the teacher's existing
/// dependency for local embeddings. Feature-gated since it pulls in model
/// weights at first use; the default daemon runs on [`HashEmbedder`].
#[cfg(feature = "local-embeddings")]
pub struct FastEmbedEmbedder {
    model: parking_lot::Mutex<fastembed::TextEmbedding>,
    dimensions: usize,
}

#[cfg(feature = "local-embeddings")]
impl FastEmbedEmbedder {
    pub fn try_new() -> Result<Self> {
        use fastembed::{InitOptions, TextEmbedding};

        let model = TextEmbedding::try_new(InitOptions::new(
            fastembed::EmbeddingModel::BGESmallENV15,
        ))
        .map_err(|e| ContextdError::Embed(format!("failed to load fastembed model: {e}")))?;

        Ok(Self {
            model: parking_lot::Mutex::new(model),
            dimensions: 384,
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        out.pop()
            .ok_or_else(|| ContextdError::Embed("fastembed returned no vectors".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let documents: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let model = self.model.lock();
        model
            .embed(documents, None)
            .map_err(|e| ContextdError::Embed(format!("fastembed failed: {e}")))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_produces_configured_dimensions() {
        let embedder = HashEmbedder::new(64);
        let vector = embedder.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 64);
        assert_eq!(embedder.dimensions(), 64);
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("connection refused").await.unwrap();
        let b = embedder.embed("connection refused").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn hash_embedder_distinguishes_different_text() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("connection refused").await.unwrap();
        let b = embedder.embed("out of memory").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn hash_embedder_zero_dimensions_is_embed_error() {
        let embedder = HashEmbedder::new(0);
        assert!(embedder.embed("x").await.is_err());
    }

    #[tokio::test]
    async fn embed_batch_default_impl_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        let a = embedder.embed("a").await.unwrap();
        assert_eq!(batch[0], a);
    }
}
