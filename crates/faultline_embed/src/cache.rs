//! Process-wide embedding cache.
//!
//! Vectors are deterministic per `(model, text)`, so the cache keys on the
//! model name plus a hash of the first 500 characters of the text. Lost
//! races on insert are harmless: both writers hold the same vector.

use crate::embedder::{truncate_chars, Embedder};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

/// Number of leading characters that participate in the cache key.
const KEY_PREFIX_CHARS: usize = 500;

/// Cache key: model identifier plus text-prefix hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    text_hash: u64,
}

impl CacheKey {
    fn new(model: &str, text: &str) -> Self {
        Self {
            model: model.to_string(),
            text_hash: xxh64(truncate_chars(text, KEY_PREFIX_CHARS).as_bytes(), 0),
        }
    }
}

/// A concurrent map from `(model, text prefix)` to embedding vector.
///
/// Unbounded: a discovery batch is assumed to fit in memory.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<CacheKey, Vec<f64>>,
}

impl EmbeddingCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a cached vector.
    #[must_use]
    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f64>> {
        self.entries
            .get(&CacheKey::new(model, text))
            .map(|entry| entry.value().clone())
    }

    /// Inserts a vector, replacing any previous entry for the key.
    pub fn insert(&self, model: &str, text: &str, vector: Vec<f64>) {
        self.entries.insert(CacheKey::new(model, text), vector);
    }

    /// Returns the number of cached vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An embedder that consults a shared cache before its inner provider.
///
/// Callers never see the provider directly; every vector flows through the
/// cache.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Arc<EmbeddingCache>,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Wraps an embedder with the given cache.
    #[must_use]
    pub fn new(inner: E, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    /// Wraps an embedder with a fresh private cache.
    #[must_use]
    pub fn with_fresh_cache(inner: E) -> Self {
        Self::new(inner, Arc::new(EmbeddingCache::new()))
    }

    /// The cache backing this embedder.
    #[must_use]
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        if let Some(vector) = self.cache.get(self.inner.model(), text) {
            trace!("Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        self.cache
            .insert(self.inner.model(), text, vector.clone());
        Ok(vector)
    }
}
