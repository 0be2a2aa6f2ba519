//! # Caching Module
//!
//! Generic TTL cache with lazy expiry plus the key-shaping facades used by
//! the application: API responses, query results, and namespaced objects.
//!
//! Expiry is lazy on purpose: there is no background sweeper thread, and an
//! expired entry is logically absent the moment its TTL elapses even while
//! still physically present. Reads, `size()` and `keys()` treat expired
//! entries as deleted and evict them opportunistically.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::debug;

use crate::now_millis;

/// Default TTL for cached API responses.
pub const API_RESPONSE_TTL_MS: u64 = 5 * 60 * 1000;
/// Default TTL for cached query results.
pub const QUERY_RESULT_TTL_MS: u64 = 10 * 60 * 1000;
/// Default TTL for the generic object cache.
pub const OBJECT_TTL_MS: u64 = 5 * 60 * 1000;

/// Cache entry with access metadata.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    created_at: i64,
    ttl_ms: u64,
    hit_count: u64,
    last_accessed_at: i64,
}

impl<T> CacheEntry<T> {
    /// An entry is live iff `now - created_at <= ttl`.
    fn is_expired(&self, now: i64) -> bool {
        now - self.created_at > self.ttl_ms as i64
    }
}

/// Access metadata for a live cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    /// When the entry was created (unix millis)
    pub created_at: i64,
    /// Entry TTL in milliseconds
    pub ttl_ms: u64,
    /// Successful lookups since the entry was set
    pub hit_count: u64,
    /// Last successful lookup (unix millis)
    pub last_accessed_at: i64,
    /// When the entry stops being live (unix millis)
    pub expires_at: i64,
}

/// # Cache Statistics
///
/// Counters for cache performance. `hit_rate` is a percentage over lookups
/// (`get` calls), never dividing by zero, and `size` is the live entry count
/// after sweeping expired entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Successful lookups
    pub hits: u64,
    /// Failed lookups, including lookups of expired entries
    pub misses: u64,
    /// `set` calls
    pub sets: u64,
    /// Entries removed by explicit delete
    pub deletes: u64,
    /// `clear` calls
    pub clears: u64,
    /// `hits / (hits + misses) * 100`, or 0 when there were no lookups
    pub hit_rate: f64,
    /// Live entry count
    pub size: usize,
}

/// # TTL Cache
///
/// Keyed store with per-entry TTL and hit/miss/set/delete counters. Cheap to
/// clone; clones share the same entries and counters.
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    entries: Arc<DashMap<String, CacheEntry<T>>>,
    default_ttl_ms: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
    deletes: Arc<AtomicU64>,
    clears: Arc<AtomicU64>,
}

impl<T: Clone> TtlCache<T> {
    /// Create a cache with the given default TTL.
    pub fn new(default_ttl_ms: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl_ms,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
            deletes: Arc::new(AtomicU64::new(0)),
            clears: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Look up a key. An absent key counts a miss; an expired entry is
    /// evicted and counts a miss; a live entry bumps its hit count and
    /// `last_accessed_at`, counts a global hit, and returns a clone.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = now_millis();
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if !entry.is_expired(now) {
                    entry.hit_count += 1;
                    entry.last_accessed_at = now;
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.data.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
            debug!(key, "cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, unconditionally overwriting any existing entry. The
    /// hit count resets to zero and the TTL clock restarts now.
    pub fn set(&self, key: impl Into<String>, value: T, ttl_ms: Option<u64>) {
        let now = now_millis();
        let entry = CacheEntry {
            data: value,
            created_at: now,
            ttl_ms: ttl_ms.unwrap_or(self.default_ttl_ms),
            hit_count: 0,
            last_accessed_at: now,
        };
        self.entries.insert(key.into(), entry);
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove a key. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every key starting with `prefix`. Returns the removed count.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let size = self.entries.len();
        self.entries.clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
        if size > 0 {
            debug!(size, "cleared cache entries");
        }
    }

    /// Whether a live entry exists for the key. Same expiry semantics as
    /// [`get`](Self::get), including lazy eviction, but touches neither the
    /// entry hit count nor the global hit/miss counters.
    pub fn has(&self, key: &str) -> bool {
        let now = now_millis();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            self.entries.remove(key);
            return false;
        }
        true
    }

    /// Live entry count. Sweeps expired entries first, so the result never
    /// includes entries that are logically absent.
    pub fn size(&self) -> usize {
        self.sweep_expired();
        self.entries.len()
    }

    /// Keys of live entries, after an expired-entry sweep.
    pub fn keys(&self) -> Vec<String> {
        self.sweep_expired();
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Access metadata for a live entry. Expired entries are evicted and
    /// reported as absent.
    pub fn metadata(&self, key: &str) -> Option<CacheEntryMetadata> {
        let now = now_millis();
        let meta = match self.entries.get(key) {
            Some(entry) => {
                if entry.is_expired(now) {
                    None
                } else {
                    Some(CacheEntryMetadata {
                        created_at: entry.created_at,
                        ttl_ms: entry.ttl_ms,
                        hit_count: entry.hit_count,
                        last_accessed_at: entry.last_accessed_at,
                        expires_at: entry.created_at + entry.ttl_ms as i64,
                    })
                }
            }
            None => return None,
        };
        if meta.is_none() {
            self.entries.remove(key);
        }
        meta
    }

    /// Current counters plus live size.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            hit_rate,
            size: self.size(),
        }
    }

    fn sweep_expired(&self) {
        let now = now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
    }
}

/// Canonical encoding of a parameter object: keys sorted, `k=v` pairs joined
/// with `&`, so parameter order never changes the cache key.
fn canonical_params(params: &Value) -> String {
    match params {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.iter()
                .map(|k| format!("{}={}", k, map[k.as_str()]))
                .collect::<Vec<_>>()
                .join("&")
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// # API Response Cache
///
/// Key-shaping facade over one [`TtlCache`]: keys are built from an endpoint
/// plus a canonicalized parameter object. Supports invalidating a whole
/// endpoint at once.
#[derive(Debug, Clone)]
pub struct ApiResponseCache {
    inner: TtlCache<Value>,
}

impl ApiResponseCache {
    pub fn new() -> Self {
        Self::with_ttl(API_RESPONSE_TTL_MS)
    }

    pub fn with_ttl(default_ttl_ms: u64) -> Self {
        Self {
            inner: TtlCache::new(default_ttl_ms),
        }
    }

    fn key(endpoint: &str, params: &Value) -> String {
        format!("{}::{}", endpoint, canonical_params(params))
    }

    pub fn get(&self, endpoint: &str, params: &Value) -> Option<Value> {
        self.inner.get(&Self::key(endpoint, params))
    }

    pub fn set(&self, endpoint: &str, params: &Value, response: Value, ttl_ms: Option<u64>) {
        self.inner.set(Self::key(endpoint, params), response, ttl_ms);
    }

    /// Delete every cached response for the endpoint. Returns the number of
    /// entries removed.
    pub fn clear_endpoint(&self, endpoint: &str) -> usize {
        self.inner.delete_prefix(&format!("{}::", endpoint))
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn clear(&self) {
        self.inner.clear()
    }
}

impl Default for ApiResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// # Query Cache
///
/// Same canonical keying as [`ApiResponseCache`], tuned for query results
/// with a longer default TTL.
#[derive(Debug, Clone)]
pub struct QueryCache {
    inner: TtlCache<Value>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_ttl(QUERY_RESULT_TTL_MS)
    }

    pub fn with_ttl(default_ttl_ms: u64) -> Self {
        Self {
            inner: TtlCache::new(default_ttl_ms),
        }
    }

    fn key(query: &str, params: &Value) -> String {
        format!("{}::{}", query, canonical_params(params))
    }

    pub fn get(&self, query: &str, params: &Value) -> Option<Value> {
        self.inner.get(&Self::key(query, params))
    }

    pub fn set(&self, query: &str, params: &Value, result: Value, ttl_ms: Option<u64>) {
        self.inner.set(Self::key(query, params), result, ttl_ms);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn clear(&self) {
        self.inner.clear()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// # Object Cache
///
/// Namespaced generic facade over one [`TtlCache`].
#[derive(Debug, Clone)]
pub struct ObjectCache<T> {
    inner: TtlCache<T>,
    namespace: String,
}

impl<T: Clone> ObjectCache<T> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_ttl(namespace, OBJECT_TTL_MS)
    }

    pub fn with_ttl(namespace: impl Into<String>, default_ttl_ms: u64) -> Self {
        Self {
            inner: TtlCache::new(default_ttl_ms),
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.inner.get(&self.key(key))
    }

    pub fn set(&self, key: &str, value: T, ttl_ms: Option<u64>) {
        self.inner.set(self.key(key), value, ttl_ms);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.delete(&self.key(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.has(&self.key(key))
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn clear(&self) {
        self.inner.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expired_lookup_counts_as_miss_and_evicts() {
        let cache: TtlCache<String> = TtlCache::new(1000);
        cache.set("k", "v".to_string(), Some(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn has_does_not_touch_hit_counters() {
        let cache: TtlCache<u32> = TtlCache::new(1000);
        cache.set("k", 7, None);
        assert!(cache.has("k"));
        assert!(!cache.has("missing"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn overwrite_resets_hit_count() {
        let cache: TtlCache<u32> = TtlCache::new(1000);
        cache.set("k", 1, None);
        cache.get("k");
        cache.get("k");
        assert_eq!(cache.metadata("k").unwrap().hit_count, 2);
        cache.set("k", 2, None);
        assert_eq!(cache.metadata("k").unwrap().hit_count, 0);
    }

    #[test]
    fn parameter_order_does_not_change_the_key() {
        let cache = ApiResponseCache::new();
        cache.set(
            "/api/projects",
            &json!({"region": "na", "status": "funding"}),
            json!({"items": []}),
            None,
        );
        let hit = cache.get("/api/projects", &json!({"status": "funding", "region": "na"}));
        assert!(hit.is_some());
    }

    #[test]
    fn clear_endpoint_removes_only_matching_prefix() {
        let cache = ApiResponseCache::new();
        cache.set("/api/projects", &json!({"page": 1}), json!(1), None);
        cache.set("/api/projects", &json!({"page": 2}), json!(2), None);
        cache.set("/api/votes", &json!({}), json!(3), None);
        assert_eq!(cache.clear_endpoint("/api/projects"), 2);
        assert!(cache.get("/api/votes", &json!({})).is_some());
    }
}
