//! Query result cache with LRU eviction and per-entry TTL.
//!
//! Keys are the query type followed by a canonical JSON rendering of the
//! parameters (object keys sorted at every level), so logically identical
//! queries collide no matter how their parameters were built.
//!
//! Expiry is lazy: an expired entry is removed by the `get` that finds it,
//! or by LRU eviction. Recency is updated on every hit, so reads take the
//! same lock as writes.
//!
//! `query` runs `compute` outside the lock. Two callers racing a miss on the
//! same key may both compute; `compute` is expected to be idempotent.

use crate::error::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries dropped because their TTL ran out
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Build the cache key for a query type and its parameters.
///
/// ```
/// use framedex::cache::cache_key;
/// use serde_json::json;
///
/// let a = cache_key("overlap", &json!({"objects": ["car"], "count": 2}));
/// let b = cache_key("overlap", &json!({"count": 2, "objects": ["car"]}));
/// assert_eq!(a, b);
/// ```
pub fn cache_key(query_type: &str, params: &Value) -> String {
    format!("{}:{}", query_type, canonicalize(params))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

struct Slot<V> {
    key: String,
    value: V,
    created_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Slab-backed doubly linked list ordered by recency, plus a key index.
struct LruState<V> {
    index: FxHashMap<String, usize>,
    slots: Vec<Option<Slot<V>>>,
    free: Vec<usize>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    stats: CacheStats,
}

impl<V> LruState<V> {
    fn new(capacity: usize) -> Self {
        Self {
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            stats: CacheStats::default(),
        }
    }

    fn slot(&self, idx: usize) -> Option<&Slot<V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot<V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.slot(idx).map(|s| (s.prev, s.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(slot) = self.slot_mut(p) {
                    slot.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = self.slot_mut(n) {
                    slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(slot) = self.slot_mut(idx) {
            slot.prev = None;
            slot.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(slot) = self.slot_mut(idx) {
            slot.prev = None;
            slot.next = old_head;
        }
        if let Some(h) = old_head
            && let Some(slot) = self.slot_mut(h)
        {
            slot.prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn remove(&mut self, idx: usize) -> Option<Slot<V>> {
        self.detach(idx);
        let slot = self.slots.get_mut(idx).and_then(Option::take)?;
        self.index.remove(&slot.key);
        self.free.push(idx);
        Some(slot)
    }

    fn allocate(&mut self, slot: Slot<V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }
}

/// Capacity-bounded LRU cache with per-entry expiry.
///
/// # Examples
///
/// ```
/// use framedex::cache::QueryCache;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let cache = QueryCache::new(2, Duration::from_secs(60));
/// let params = json!({"objects": ["dog"]});
///
/// let mut calls = 0;
/// let first = cache.query("detections", &params, || { calls += 1; 42 });
/// let second = cache.query("detections", &params, || { calls += 1; 0 });
/// assert_eq!((first, second, calls), (42, 42, 1));
/// ```
pub struct QueryCache<V> {
    state: Mutex<LruState<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(LruState::new(capacity)),
            capacity,
            ttl,
        }
    }

    /// Look up a cached result, refreshing its recency.
    pub fn get(&self, query_type: &str, params: &Value) -> Option<V> {
        self.get_at(query_type, params, Instant::now())
    }

    /// Look up a cached result as of `now`.
    pub fn get_at(&self, query_type: &str, params: &Value, now: Instant) -> Option<V> {
        let key = cache_key(query_type, params);
        let mut state = self.state.lock();

        let Some(&idx) = state.index.get(&key) else {
            state.stats.misses += 1;
            return None;
        };

        let expired = state
            .slot(idx)
            .is_none_or(|slot| now.saturating_duration_since(slot.created_at) >= self.ttl);
        if expired {
            state.remove(idx);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            log::debug!("Cache entry expired: {}", key);
            return None;
        }

        state.detach(idx);
        state.push_front(idx);
        state.stats.hits += 1;
        state.slot(idx).map(|slot| slot.value.clone())
    }

    /// Store a result, evicting the least recently used entry when full.
    pub fn set(&self, query_type: &str, params: &Value, value: V) {
        self.set_at(query_type, params, value, Instant::now());
    }

    pub fn set_at(&self, query_type: &str, params: &Value, value: V, now: Instant) {
        let key = cache_key(query_type, params);
        let mut state = self.state.lock();
        state.stats.sets += 1;

        if let Some(&idx) = state.index.get(&key) {
            if let Some(slot) = state.slot_mut(idx) {
                slot.value = value;
                slot.created_at = now;
            }
            state.detach(idx);
            state.push_front(idx);
            return;
        }

        let idx = state.allocate(Slot {
            key: key.clone(),
            value,
            created_at: now,
            prev: None,
            next: None,
        });
        state.index.insert(key, idx);
        state.push_front(idx);

        while state.index.len() > self.capacity {
            let Some(tail) = state.tail else {
                break;
            };
            if let Some(evicted) = state.remove(tail) {
                state.stats.evictions += 1;
                log::debug!("Cache evicted least recently used entry: {}", evicted.key);
            }
        }
    }

    /// Read-through helper: return the cached value or compute and store it.
    pub fn query(&self, query_type: &str, params: &Value, compute: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(query_type, params) {
            return hit;
        }
        let value = compute();
        self.set(query_type, params, value.clone());
        value
    }

    /// Like [`query`](Self::query) for fallible computations. Errors are
    /// returned to the caller and never cached.
    pub fn try_query(
        &self,
        query_type: &str,
        params: &Value,
        compute: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if let Some(hit) = self.get(query_type, params) {
            return Ok(hit);
        }
        let value = compute()?;
        self.set(query_type, params, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, query_type: &str, params: &Value) -> bool {
        let key = cache_key(query_type, params);
        let mut state = self.state.lock();
        match state.index.get(&key).copied() {
            Some(idx) => state.remove(idx).is_some(),
            None => false,
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let stats = std::mem::take(&mut state.stats);
        *state = LruState::new(self.capacity);
        state.stats = stats;
    }

    /// Entries physically held, including expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(name: &str) -> Value {
        json!({ "objects": [name] })
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = QueryCache::new(2, Duration::from_secs(60));
        cache.set("q", &p("a"), 1);
        cache.set("q", &p("b"), 2);
        cache.set("q", &p("c"), 3);

        assert_eq!(cache.get("q", &p("a")), None);
        assert_eq!(cache.get("q", &p("b")), Some(2));
        assert_eq!(cache.get("q", &p("c")), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = QueryCache::new(2, Duration::from_secs(60));
        cache.set("q", &p("a"), 1);
        cache.set("q", &p("b"), 2);
        assert_eq!(cache.get("q", &p("a")), Some(1));
        cache.set("q", &p("c"), 3);

        assert_eq!(cache.get("q", &p("a")), Some(1));
        assert_eq!(cache.get("q", &p("b")), None);
        assert_eq!(cache.get("q", &p("c")), Some(3));
    }

    #[test]
    fn test_expired_entry_is_lazy_miss() {
        let ttl = Duration::from_secs(10);
        let cache = QueryCache::new(4, ttl);
        let t0 = Instant::now();
        cache.set_at("q", &p("a"), 1, t0);

        assert_eq!(cache.get_at("q", &p("a"), t0 + Duration::from_secs(5)), Some(1));
        // Still physically present until a get notices the expiry.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at("q", &p("a"), t0 + ttl), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_overwrite_resets_age() {
        let ttl = Duration::from_secs(10);
        let cache = QueryCache::new(4, ttl);
        let t0 = Instant::now();
        cache.set_at("q", &p("a"), 1, t0);
        cache.set_at("q", &p("a"), 2, t0 + Duration::from_secs(8));
        assert_eq!(
            cache.get_at("q", &p("a"), t0 + Duration::from_secs(12)),
            Some(2)
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = json!({"objects": ["car"], "area": [0.0, 0.0, 1.0, 1.0], "range": {"start": 1, "end": 2}});
        let b = json!({"range": {"end": 2, "start": 1}, "area": [0.0, 0.0, 1.0, 1.0], "objects": ["car"]});
        assert_eq!(cache_key("x", &a), cache_key("x", &b));
        assert_ne!(cache_key("x", &a), cache_key("y", &a));

        let cache = QueryCache::default();
        cache.set("x", &a, "hit");
        assert_eq!(cache.get("x", &b), Some("hit"));
    }

    #[test]
    fn test_query_computes_once() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        let mut calls = 0;
        for _ in 0..5 {
            let v = cache.query("q", &p("a"), || {
                calls += 1;
                "value".to_string()
            });
            assert_eq!(v, "value");
        }
        assert_eq!(calls, 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets), (4, 1, 1));
        assert!((stats.hit_rate() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_try_query_does_not_cache_errors() {
        use crate::error::FramedexError;

        let cache: QueryCache<u32> = QueryCache::default();
        let err = cache.try_query("q", &p("a"), || {
            Err(FramedexError::StoreUnavailable("down".into()))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.try_query("q", &p("a"), || Ok(7)).unwrap(), 7);
        assert_eq!(cache.get("q", &p("a")), Some(7));
    }

    #[test]
    fn test_slot_reuse_after_eviction() {
        let cache = QueryCache::new(3, Duration::from_secs(60));
        for i in 0..100 {
            cache.set("q", &json!(i), i);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("q", &json!(99)), Some(99));
        assert_eq!(cache.get("q", &json!(97)), Some(97));
        assert_eq!(cache.get("q", &json!(96)), None);
        assert!(cache.invalidate("q", &json!(98)));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 97);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(QueryCache::new(16, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = json!((t * 7 + i) % 32);
                        let v = cache.query("q", &key, || (t * 7 + i) % 32);
                        assert_eq!(v, (t * 7 + i) % 32);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 16);
    }
}
