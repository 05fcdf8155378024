//! Two-tier cache: an embedding cache keyed by `(model_id, content_hash)`
//! and a result cache keyed by a hash of `(query, tenant, agent, options)`.
//!
//! Grounded on the teacher's single `query_cache: Mutex<LruCache<..>>` used
//! to avoid re-embedding repeated queries, generalized here into two
//! independently-sized, independently-TTL'd instances with tenant-scoped
//! invalidation.

pub mod ttl_lru;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

pub use ttl_lru::{CacheStats, TtlLruCache};

use crate::memory::{Memory, MemoryType};

/// Fixed TTL for the `get_context` cache, per spec regardless of the
/// configured result-cache TTL.
const CONTEXT_CACHE_TTL: Duration = Duration::from_secs(300);

/// A cached recall result list entry: the ordered memory ids and scores
/// produced by a prior `recall` call, replayed verbatim on a cache hit.
#[derive(Debug, Clone)]
pub struct CachedResultEntry {
    /// Memory ids in rank order.
    pub memory_ids: Vec<uuid::Uuid>,
    /// Scores parallel to `memory_ids`.
    pub scores: Vec<f64>,
}

/// A cached `get_context` response, replayed verbatim on a cache hit.
#[derive(Debug, Clone)]
pub struct CachedContextEntry {
    /// The bounded recent-memory set.
    pub memories: Vec<Memory>,
    /// Count of memories per type.
    pub type_counts: HashMap<MemoryType, usize>,
    /// `mean(importance) * recency_present`.
    pub confidence: f64,
}

/// Owns the embedding cache, the recall result cache, and the `get_context`
/// cache. All three are `String`-keyed `TtlLruCache` instances guarded by
/// their own `RwLock` so a read-heavy cache doesn't contend with another's
/// writes.
pub struct CacheLayer {
    embeddings: RwLock<TtlLruCache<Vec<f32>>>,
    results: RwLock<TtlLruCache<CachedResultEntry>>,
    contexts: RwLock<TtlLruCache<CachedContextEntry>>,
}

impl CacheLayer {
    /// Builds a cache layer. `embed_ttl`/`result_ttl` are the default TTLs;
    /// `max_size` bounds entry count for all three instances. The context
    /// cache always uses the fixed 5-minute TTL spec'd for it.
    pub fn new(max_size: usize, embed_ttl: Duration, result_ttl: Duration) -> Self {
        Self {
            embeddings: RwLock::new(TtlLruCache::new(max_size, embed_ttl)),
            results: RwLock::new(TtlLruCache::new(max_size, result_ttl)),
            contexts: RwLock::new(TtlLruCache::new(max_size, CONTEXT_CACHE_TTL)),
        }
    }

    /// Canonical embedding-cache key: `"{tenant_id}:{model_id}:{content_hash}"`.
    /// The tenant prefix makes `invalidate_tenant` exact rather than a
    /// substring scan.
    pub fn embedding_key(tenant_id: &str, model_id: &str, content_hash: &str) -> String {
        format!("{tenant_id}:{model_id}:{content_hash}")
    }

    /// Canonical result-cache key: tenant-prefixed hash of the query shape.
    pub fn result_key(tenant_id: &str, query_fingerprint: &str) -> String {
        format!("{tenant_id}:{query_fingerprint}")
    }

    /// Canonical context-cache key: tenant prefixed, scoped to agent if given.
    pub fn context_key(tenant_id: &str, agent_id: Option<&str>) -> String {
        format!("{tenant_id}:{}", agent_id.unwrap_or("*"))
    }

    /// Looks up a cached embedding.
    pub fn get_embedding(&self, key: &str) -> Option<Vec<f32>> {
        self.embeddings.write().unwrap().get(key)
    }

    /// Caches an embedding under `tenant_id`.
    pub fn put_embedding(&self, tenant_id: &str, key: String, vector: Vec<f32>) {
        self.embeddings.write().unwrap().put(tenant_id, key, vector);
    }

    /// Looks up a cached result list.
    pub fn get_result(&self, key: &str) -> Option<CachedResultEntry> {
        self.results.write().unwrap().get(key)
    }

    /// Caches a result list under `tenant_id` with an explicit TTL override
    /// is not supported by the underlying cache (single TTL per instance);
    /// `recall`'s `RESULT_TTL_LARGE` distinction is handled by the caller
    /// choosing not to cache oversized result sets rather than a per-entry TTL.
    pub fn put_result(&self, tenant_id: &str, key: String, entry: CachedResultEntry) {
        self.results.write().unwrap().put(tenant_id, key, entry);
    }

    /// Looks up a cached `get_context` response.
    pub fn get_context(&self, key: &str) -> Option<CachedContextEntry> {
        self.contexts.write().unwrap().get(key)
    }

    /// Caches a `get_context` response under `tenant_id` for the fixed
    /// 5-minute context TTL.
    pub fn put_context(&self, tenant_id: &str, key: String, entry: CachedContextEntry) {
        self.contexts.write().unwrap().put(tenant_id, key, entry);
    }

    /// Invalidates every cached result and context entry for `tenant_id`.
    /// Per spec, writes (remember/forget) invalidate only read-side caches;
    /// the embedding cache is content-addressed and unaffected by tenant
    /// writes.
    pub fn invalidate_tenant_reads(&self, tenant_id: &str) {
        self.results.write().unwrap().invalidate_tenant(tenant_id);
        self.contexts.write().unwrap().invalidate_tenant(tenant_id);
    }

    /// Runs the periodic sweep on all three caches.
    pub fn sweep(&self) {
        self.embeddings.write().unwrap().sweep_expired();
        self.results.write().unwrap().sweep_expired();
        self.contexts.write().unwrap().sweep_expired();
    }

    /// Result-cache fill ratio, used by the optimizer's cache-prune step.
    pub fn result_fill_ratio(&self) -> f64 {
        self.results.read().unwrap().fill_ratio()
    }

    /// Clears stale result-cache entries when near capacity (fill ratio
    /// `>= 0.9`), per the optimizer's cache-prune step.
    pub fn prune_if_near_capacity(&self, threshold: f64) {
        let mut results = self.results.write().unwrap();
        if results.fill_ratio() >= threshold {
            results.sweep_expired();
        }
    }

    /// Embedding-cache statistics.
    pub fn embedding_stats(&self) -> CacheStats {
        self.embeddings.read().unwrap().stats()
    }

    /// Result-cache statistics.
    pub fn result_stats(&self) -> CacheStats {
        self.results.read().unwrap().stats()
    }

    /// Total entries across all three caches, for health reporting.
    pub fn total_entries(&self) -> usize {
        self.embeddings.read().unwrap().len()
            + self.results.read().unwrap().len()
            + self.contexts.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_and_result_caches_are_independent() {
        let layer = CacheLayer::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let key = CacheLayer::embedding_key("t1", "model-a", "hash123");
        layer.put_embedding("t1", key.clone(), vec![1.0, 2.0]);
        assert_eq!(layer.get_embedding(&key), Some(vec![1.0, 2.0]));
        assert_eq!(layer.get_result(&key), None);
    }

    #[test]
    fn invalidate_tenant_reads_spares_embeddings() {
        let layer = CacheLayer::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let embed_key = CacheLayer::embedding_key("t1", "model-a", "hash123");
        let result_key = CacheLayer::result_key("t1", "query-fingerprint");
        let context_key = CacheLayer::context_key("t1", None);
        layer.put_embedding("t1", embed_key.clone(), vec![1.0]);
        layer.put_result(
            "t1",
            result_key.clone(),
            CachedResultEntry {
                memory_ids: vec![],
                scores: vec![],
            },
        );
        layer.put_context(
            "t1",
            context_key.clone(),
            CachedContextEntry {
                memories: vec![],
                type_counts: HashMap::new(),
                confidence: 0.0,
            },
        );
        layer.invalidate_tenant_reads("t1");
        assert!(layer.get_embedding(&embed_key).is_some());
        assert!(layer.get_result(&result_key).is_none());
        assert!(layer.get_context(&context_key).is_none());
    }
}
