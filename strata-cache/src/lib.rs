#![deny(missing_docs)]
//! Content-addressed caches for compiled artifacts and generative
//! results.
//!
//! Both caches ride the [`EdgeCache`] protocol and key on the SHA-256
//! digest of the canonical source text. They live in separate key
//! namespaces (`compile:` / `genai:`) so the two content-addressed
//! spaces cannot collide. Entries are best-effort: a miss on a present
//! entry is allowed, eviction is opaque, and invalidation by function ID
//! is unsupported — callers rotate digests by changing source.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tier0::{content_hash, EdgeCache, Language};
use tokio::sync::RwLock;
use tracing::debug;

/// Default TTL for cached entries, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Hit/miss counters for one cache facade. Per process — they reset
/// across isolates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned an entry.
    pub hits: u64,
    /// Lookups that returned nothing.
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// In-memory [`EdgeCache`] with per-entry TTL, expired lazily on read.
///
/// A `HashMap` behind a `RwLock` — suitable for testing and
/// single-process deployments.
#[derive(Default)]
pub struct MemoryEdgeCache {
    entries: RwLock<HashMap<String, (Value, Instant)>>,
}

impl MemoryEdgeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EdgeCache for MemoryEdgeCache {
    async fn get_by_key(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires)) if *expires > now => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry present but expired: drop it.
        self.entries.write().await.remove(key);
        None
    }

    async fn put(&self, key: &str, value: Value, ttl_seconds: u64) {
        let expires = Instant::now() + std::time::Duration::from_secs(ttl_seconds);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires));
    }
}

/// A compiled artifact as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedArtifact {
    /// The compiled wire-form artifact.
    pub compiled_code: String,
    /// Source language.
    pub language: Language,
    /// How long the original compilation took, in ms.
    pub compilation_time_ms: u64,
    /// The content digest this entry is keyed by.
    pub hash: String,
    /// Unix-millisecond timestamp of the write.
    pub cached_at: u64,
}

/// Content-addressed cache of compiled artifacts (namespace `compile:`).
pub struct ArtifactCache {
    backend: Arc<dyn EdgeCache>,
    ttl_seconds: u64,
    counters: Counters,
}

impl ArtifactCache {
    /// Wrap an edge-cache backend with the default 1-hour TTL.
    pub fn new(backend: Arc<dyn EdgeCache>) -> Self {
        Self::with_ttl(backend, DEFAULT_TTL_SECONDS)
    }

    /// Wrap an edge-cache backend with an explicit TTL.
    pub fn with_ttl(backend: Arc<dyn EdgeCache>, ttl_seconds: u64) -> Self {
        Self {
            backend,
            ttl_seconds,
            counters: Counters::default(),
        }
    }

    fn key(digest: &str) -> String {
        format!("compile:{digest}")
    }

    /// Digest of the canonical source text — the cache key.
    pub fn digest(source: &str) -> String {
        content_hash(source)
    }

    /// Look up a compiled artifact by source digest.
    pub async fn get(&self, digest: &str) -> Option<CachedArtifact> {
        let found = self.backend.get_by_key(&Self::key(digest)).await;
        let entry = found.and_then(|v| serde_json::from_value(v).ok());
        self.counters.record(entry.is_some());
        if entry.is_some() {
            debug!(digest, "artifact cache hit");
        }
        entry
    }

    /// Store a compiled artifact under its source digest.
    pub async fn put(&self, entry: &CachedArtifact) {
        if let Ok(value) = serde_json::to_value(entry) {
            self.backend
                .put(&Self::key(&entry.hash), value, self.ttl_seconds)
                .await;
        }
    }

    /// Snapshot the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Reset the hit/miss counters.
    pub fn reset_stats(&self) {
        self.counters.reset()
    }
}

/// Content-addressed cache of generative results (namespace `genai:`).
pub struct ResultCache {
    backend: Arc<dyn EdgeCache>,
    ttl_seconds: u64,
    counters: Counters,
}

impl ResultCache {
    /// Wrap an edge-cache backend with the default 1-hour TTL.
    pub fn new(backend: Arc<dyn EdgeCache>) -> Self {
        Self::with_ttl(backend, DEFAULT_TTL_SECONDS)
    }

    /// Wrap an edge-cache backend with an explicit TTL.
    pub fn with_ttl(backend: Arc<dyn EdgeCache>, ttl_seconds: u64) -> Self {
        Self {
            backend,
            ttl_seconds,
            counters: Counters::default(),
        }
    }

    fn key(digest: &str) -> String {
        format!("genai:{digest}")
    }

    /// Look up a cached value by request digest.
    pub async fn get(&self, digest: &str) -> Option<Value> {
        let entry = self.backend.get_by_key(&Self::key(digest)).await;
        self.counters.record(entry.is_some());
        entry
    }

    /// Store a value under a request digest.
    pub async fn put(&self, digest: &str, value: Value) {
        self.backend
            .put(&Self::key(digest), value, self.ttl_seconds)
            .await;
    }

    /// Snapshot the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryEdgeCache::new();
        cache.put("k", json!({"a": 1}), 60).await;
        assert_eq!(cache.get_by_key("k").await, Some(json!({"a": 1})));
        assert_eq!(cache.get_by_key("other").await, None);
    }

    #[tokio::test]
    async fn memory_cache_expires() {
        let cache = MemoryEdgeCache::new();
        cache.put("k", json!(1), 0).await;
        // TTL of zero expires immediately.
        assert_eq!(cache.get_by_key("k").await, None);
    }

    #[tokio::test]
    async fn artifact_cache_counts_hits_and_misses() {
        let cache = ArtifactCache::new(Arc::new(MemoryEdgeCache::new()));
        let digest = ArtifactCache::digest("export default () => 1");

        assert!(cache.get(&digest).await.is_none());
        cache
            .put(&CachedArtifact {
                compiled_code: "export default () => 1".into(),
                language: Language::Javascript,
                compilation_time_ms: 2,
                hash: digest.clone(),
                cached_at: 0,
            })
            .await;
        assert!(cache.get(&digest).await.is_some());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);

        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let backend = Arc::new(MemoryEdgeCache::new());
        let artifacts = ArtifactCache::new(backend.clone());
        let results = ResultCache::new(backend.clone());

        let digest = content_hash("same-content");
        results.put(&digest, json!("a result")).await;

        // The artifact namespace must not see the result entry.
        assert!(artifacts.get(&digest).await.is_none());
        assert_eq!(results.get(&digest).await, Some(json!("a result")));
    }

    #[tokio::test]
    async fn last_write_wins() {
        let cache = MemoryEdgeCache::new();
        cache.put("k", json!(1), 60).await;
        cache.put("k", json!(2), 60).await;
        assert_eq!(cache.get_by_key("k").await, Some(json!(2)));
    }
}
