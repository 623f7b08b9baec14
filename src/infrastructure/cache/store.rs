//! Bounded in-memory cache with per-entry TTL and LRU eviction
//!
//! All operations run under one mutex and touch only memory; callers must
//! never hold a guard across an I/O boundary (nothing here hands one out).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::CacheStats;

#[derive(Debug, Clone)]
struct Entry<V> {
    data: V,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed_at: Instant,
    /// Monotonic recency stamp; highest = most recently used
    touched: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    touch_seq: u64,
    counters: Counters,
    evictions_unreported: u64,
}

/// Generic bounded key/value cache. `size <= max_size` always holds; an
/// expired entry is treated as absent everywhere.
#[derive(Debug)]
pub struct CacheStore<V> {
    max_size: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                touch_seq: 0,
                counters: Counters::default(),
                evictions_unreported: 0,
            }),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the value if present and not expired. A hit refreshes the
    /// entry's recency position; this is the only access-order mutation.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.counters.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.counters.misses += 1;
            return None;
        }

        inner.touch_seq += 1;
        let seq = inner.touch_seq;
        let entry = inner.entries.get_mut(key).expect("checked above");

        entry.access_count += 1;
        entry.last_accessed_at = now;
        entry.touched = seq;

        let data = entry.data.clone();
        inner.counters.hits += 1;

        Some(data)
    }

    /// Inserts or replaces an entry. Replacement counts as a fresh access
    /// for ordering; inserting into a full store evicts the least-recently-
    /// used entry among non-expired survivors.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            inner.entries.retain(|_, e| !e.is_expired(now));

            while inner.entries.len() >= self.max_size {
                let lru_key = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.touched)
                    .map(|(k, _)| k.clone());

                match lru_key {
                    Some(k) => {
                        inner.entries.remove(&k);
                        inner.counters.evictions += 1;
                        inner.evictions_unreported += 1;
                    }
                    None => break,
                }
            }
        }

        inner.touch_seq += 1;
        let touched = inner.touch_seq;

        inner.entries.insert(
            key,
            Entry {
                data: value,
                created_at: now,
                ttl,
                access_count: 0,
                last_accessed_at: now,
                touched,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().unwrap().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every entry whose TTL has elapsed, independent of the lazy
    /// expiry done on reads. Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));

        before - inner.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let accesses = inner.counters.hits + inner.counters.misses;

        let hit_rate = if accesses == 0 {
            0.0
        } else {
            inner.counters.hits as f64 / accesses as f64
        };

        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hit_rate,
        }
    }

    /// Evictions since the previous call; consumed by the optimizer's
    /// pressure report.
    pub fn take_eviction_count(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.evictions_unreported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_set_and_get() {
        let cache = CacheStore::new(10);

        cache.set("key1", "value1", TTL);
        assert_eq!(cache.get("key1"), Some("value1"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = CacheStore::new(3);

        // N+1 distinct inserts with no intervening reads: the first key goes
        for i in 0..4 {
            cache.set(format!("key{}", i), i, TTL);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("key0"), None);

        for i in 1..4 {
            assert_eq!(cache.get(&format!("key{}", i)), Some(i));
        }
    }

    #[test]
    fn test_read_reorders_access() {
        let cache = CacheStore::new(3);

        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.set("c", 3, TTL);

        // Reading A makes B the least recently used
        assert_eq!(cache.get("a"), Some(1));

        cache.set("d", 4, TTL);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let cache = CacheStore::new(2);

        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        // Overwriting A counts as a fresh access, so B is now LRU
        cache.set("a", 10, TTL);
        cache.set("c", 3, TTL);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let cache = CacheStore::new(5);

        for i in 0..50 {
            cache.set(format!("key{}", i), i, TTL);
            assert!(cache.len() <= 5);
        }
    }

    #[test]
    fn test_ttl_expiry_on_read() {
        let cache = CacheStore::new(10);

        cache.set("short", 1, Duration::from_millis(30));
        assert_eq!(cache.get("short"), Some(1));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_expired_entries_dropped_before_lru_eviction() {
        let cache = CacheStore::new(2);

        cache.set("stale", 1, Duration::from_millis(10));
        cache.set("fresh", 2, TTL);

        std::thread::sleep(Duration::from_millis(30));

        // The expired entry makes room; the live one survives
        cache.set("new", 3, TTL);

        assert_eq!(cache.get("fresh"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = CacheStore::new(10);

        cache.set("stale1", 1, Duration::from_millis(10));
        cache.set("stale2", 2, Duration::from_millis(10));
        cache.set("fresh", 3, TTL);

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(3));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = CacheStore::new(10);

        cache.set("key1", 1, TTL);
        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));

        cache.set("key2", 2, TTL);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = CacheStore::new(10);
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.set("key1", 1, TTL);
        cache.get("key1");
        cache.get("key1");
        cache.get("missing");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 10);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_eviction_counter_drains() {
        let cache = CacheStore::new(2);

        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.set("c", 3, TTL);
        cache.set("d", 4, TTL);

        assert_eq!(cache.take_eviction_count(), 2);
        assert_eq!(cache.take_eviction_count(), 0);
    }
}
