//! Caching layer for query embeddings
//!
//! Questions are often repeated against the same document. Wrapping the
//! embedding client in [`CachedEmbeddingClient`] avoids a remote embedding
//! round-trip for every repeat.
//!
//! Uses the moka crate for thread-safe, async-compatible caching with TTL
//! support.
//!
//! Author: hephaex@gmail.com

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::{RagConfig, Result};
use docqa_vector::EmbeddingClient;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

// ============================================================================
// Cache Configuration
// ============================================================================

/// Configuration for cache behavior
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in embedding cache
    pub embedding_max_capacity: u64,

    /// Time-to-live for embedding cache entries (in seconds)
    pub embedding_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 10k embeddings @ ~1.5KB each = ~15MB
            embedding_max_capacity: 10_000,
            // Embeddings are stable, cache for 1 hour
            embedding_ttl_seconds: 3600,
        }
    }
}

impl From<&RagConfig> for CacheConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            embedding_max_capacity: config.embedding_cache_capacity,
            embedding_ttl_seconds: config.embedding_cache_ttl_secs,
        }
    }
}

// ============================================================================
// Embedding Cache
// ============================================================================

/// Cache for text embeddings
///
/// Keyed by the full text. Thread-safe and suitable for async contexts.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<String, Arc<Vec<f32>>>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    /// Create a new embedding cache with default configuration
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Create a new embedding cache with custom configuration
    pub fn with_config(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.embedding_max_capacity)
            .time_to_live(Duration::from_secs(config.embedding_ttl_seconds))
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::new("embedding")),
        }
    }

    /// Get an embedding from cache
    pub async fn get(&self, text: &str) -> Option<Arc<Vec<f32>>> {
        let result = self.cache.get(text).await;

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    /// Store an embedding in cache
    pub async fn put(&self, text: &str, embedding: Vec<f32>) {
        self.cache
            .insert(text.to_string(), Arc::new(embedding))
            .await;
        self.stats.record_write();
    }

    /// Clear all cached embeddings
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        // Wait for all pending invalidations to complete
        self.cache.run_pending_tasks().await;
        self.stats.reset();
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Cached Embedding Client
// ============================================================================

/// Embedding client that serves single-text embeddings from a cache
///
/// Batch requests (index builds) go straight to the inner client and are
/// not cached.
pub struct CachedEmbeddingClient {
    inner: Arc<dyn EmbeddingClient>,
    cache: EmbeddingCache,
}

impl CachedEmbeddingClient {
    pub fn new(inner: Arc<dyn EmbeddingClient>, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text).await {
            return Ok(hit.as_ref().clone());
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.put(text, embedding.clone()).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug)]
pub struct CacheStats {
    /// Cache name for identification
    name: String,
    /// Total number of cache hits
    hits: AtomicU64,
    /// Total number of cache misses
    misses: AtomicU64,
    /// Total number of cache writes
    writes: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Get total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Get a summary report
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            total_requests: self.total_requests(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_requests: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_vector::HashingEmbedding;
    use std::sync::atomic::AtomicUsize;

    struct CountingEmbedding {
        inner: HashingEmbedding,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_embedding_cache_basic() {
        let cache = EmbeddingCache::new();

        let text = "Hello, world!";
        let embedding = vec![0.1, 0.2, 0.3, 0.4];

        // Initially not in cache
        assert!(cache.get(text).await.is_none());
        assert_eq!(cache.stats().hits(), 0);
        assert_eq!(cache.stats().misses(), 1);

        // Put and retrieve
        cache.put(text, embedding.clone()).await;
        let retrieved = cache.get(text).await;
        assert_eq!(retrieved.as_deref(), Some(&embedding));
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().writes(), 1);
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let cache = EmbeddingCache::new();
        cache.put("a", vec![1.0]).await;
        cache.put("b", vec![2.0]).await;

        cache.clear().await;
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.stats().writes(), 0);
    }

    #[tokio::test]
    async fn test_cached_client_embeds_repeat_question_once() {
        let inner = Arc::new(CountingEmbedding {
            inner: HashingEmbedding::new(16),
            calls: AtomicUsize::new(0),
        });
        let client = CachedEmbeddingClient::new(inner.clone(), EmbeddingCache::new());

        let first = client.embed("What is the refund policy?").await.unwrap();
        let second = client.embed("What is the refund policy?").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.cache().stats().hits(), 1);

        client.embed("Another question").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_client_passes_batches_through() {
        let inner = Arc::new(CountingEmbedding {
            inner: HashingEmbedding::new(16),
            calls: AtomicUsize::new(0),
        });
        let client = CachedEmbeddingClient::new(inner.clone(), EmbeddingCache::new());
        let texts = vec!["one".to_string(), "two".to_string()];

        client.embed_batch(&texts).await.unwrap();
        client.embed_batch(&texts).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.cache().entry_count(), 0);
        assert_eq!(client.model(), "counting");
    }

    #[test]
    fn test_cache_config_from_rag_config() {
        let rag = RagConfig {
            embedding_cache_capacity: 42,
            embedding_cache_ttl_secs: 7,
            ..Default::default()
        };
        let config = CacheConfig::from(&rag);
        assert_eq!(config.embedding_max_capacity, 42);
        assert_eq!(config.embedding_ttl_seconds, 7);
    }
}
