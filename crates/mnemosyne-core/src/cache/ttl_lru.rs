//! Generic TTL+LRU cache with tenant-scoped invalidation.
//!
//! Two instances of this same cache back the embedding cache and the
//! result cache (see `cache::mod`). Keys are expected to embed the owning
//! tenant canonically (`"{tenant_id}:..."`) so that
//! [`TtlLruCache::invalidate_tenant`] can use an exact reverse index rather
//! than substring matching over opaque keys.

use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

use lru::LruCache;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
}

/// Monotonic hit/miss/eviction counters. Reset only via [`TtlLruCache::clear`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing (including lazily-reaped expired entries).
    pub misses: u64,
    /// Entries evicted for being over capacity.
    pub evictions: u64,
    /// Entries reaped for being expired.
    pub expirations: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, `0.0` if there have been no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A TTL+LRU cache keyed by `String` so tenant prefixes can be indexed for
/// invalidation. Not internally synchronized; callers wrap it behind a lock
/// (see `cache::mod::CacheLayer`).
pub struct TtlLruCache<V> {
    entries: LruCache<String, Entry<V>>,
    ttl: Duration,
    tenant_index: HashMap<String, HashSet<String>>,
    stats: CacheStats,
}

impl<V: Clone> TtlLruCache<V> {
    /// Builds a cache with the given capacity (entry count) and TTL.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = std::num::NonZeroUsize::new(max_size.max(1)).unwrap();
        Self {
            entries: LruCache::new(capacity),
            ttl,
            tenant_index: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    fn untrack_tenant(&mut self, tenant_id: &str, key: &str) {
        if let Some(keys) = self.tenant_index.get_mut(tenant_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.tenant_index.remove(tenant_id);
            }
        }
    }

    /// Looks up `key`. An expired entry is reaped and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.pop(key);
            self.stats.misses += 1;
            self.stats.expirations += 1;
            return None;
        }
        let now = Instant::now();
        let value = {
            let entry = self.entries.get_mut(key).expect("checked above");
            entry.last_accessed_at = now;
            entry.access_count += 1;
            entry.value.clone()
        };
        self.stats.hits += 1;
        Some(value)
    }

    /// Inserts or replaces `key`, tracked under `tenant_id` for invalidation.
    /// If the cache is at capacity, the least-recently-used entry is evicted.
    pub fn put(&mut self, tenant_id: &str, key: String, value: V) {
        if self.entries.len() >= self.entries.cap().get() && !self.entries.contains(&key) {
            if let Some((evicted_key, _)) = self.entries.pop_lru() {
                if let Some(tenant) = evicted_key.split(':').next() {
                    self.untrack_tenant(tenant, &evicted_key);
                }
                self.stats.evictions += 1;
            }
        }
        let now = Instant::now();
        self.entries.put(
            key.clone(),
            Entry {
                value,
                inserted_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );
        self.tenant_index
            .entry(tenant_id.to_string())
            .or_default()
            .insert(key);
    }

    /// Removes every entry tracked under `tenant_id` via the reverse index.
    /// Never relies on substring matching of opaque keys.
    pub fn invalidate_tenant(&mut self, tenant_id: &str) {
        if let Some(keys) = self.tenant_index.remove(tenant_id) {
            for key in keys {
                self.entries.pop(&key);
            }
        }
    }

    /// Sweeps and removes all currently-expired entries, bounding memory
    /// between accesses. Intended to be called on a timer.
    pub fn sweep_expired(&mut self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.entries.pop(&key);
            if let Some(tenant) = key.split(':').next() {
                self.untrack_tenant(tenant, &key);
            }
            self.stats.expirations += 1;
        }
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured maximum entry count.
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Fraction of capacity currently in use, in `[0, 1]`.
    pub fn fill_ratio(&self) -> f64 {
        self.entries.len() as f64 / self.entries.cap().get() as f64
    }

    /// Clears all entries and resets statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tenant_index.clear();
        self.stats = CacheStats::default();
    }

    /// Current hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_is_a_hit() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_secs(60));
        cache.put("t1", "t1:key".to_string(), 42);
        assert_eq!(cache.get("t1:key"), Some(42));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_on_unknown_key() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_entry_reaped_on_get() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_millis(1));
        cache.put("t1", "t1:key".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("t1:key"), None);
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lru_eviction_when_full() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.put("t1", "t1:a".to_string(), 1);
        cache.put("t1", "t1:b".to_string(), 2);
        cache.get("t1:a");
        cache.put("t1", "t1:c".to_string(), 3);
        assert_eq!(cache.get("t1:b"), None);
        assert_eq!(cache.get("t1:a"), Some(1));
        assert_eq!(cache.get("t1:c"), Some(3));
    }

    #[test]
    fn invalidate_tenant_removes_only_that_tenants_keys() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_secs(60));
        cache.put("t1", "t1:a".to_string(), 1);
        cache.put("t2", "t2:a".to_string(), 2);
        cache.invalidate_tenant("t1");
        assert_eq!(cache.get("t1:a"), None);
        assert_eq!(cache.get("t2:a"), Some(2));
    }

    #[test]
    fn hit_rate_computation() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_secs(60));
        cache.put("t1", "t1:a".to_string(), 1);
        cache.get("t1:a");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clear_resets_stats_and_entries() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_secs(60));
        cache.put("t1", "t1:a".to_string(), 1);
        cache.get("t1:a");
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn sweep_expired_removes_stale_entries_proactively() {
        let mut cache: TtlLruCache<i32> = TtlLruCache::new(10, Duration::from_millis(1));
        cache.put("t1", "t1:a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep_expired();
        assert_eq!(cache.len(), 0);
    }
}
