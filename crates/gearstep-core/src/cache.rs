//! # LRU Cache
//!
//! Bounded least-recently-used cache with a logical clock.
//!
//! The semantic strategy keeps query embeddings here so the embedder is
//! called once per distinct query text. Recency is an integer counter, not
//! wall time, so eviction order depends only on the sequence of calls.

use std::collections::BTreeMap;

/// Default number of cached entries.
pub const DEFAULT_CACHE_SIZE: usize = 256;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    last_access: u64,
}

/// LRU cache over `BTreeMap` storage.
///
/// A second index (`last_access -> key`) makes finding the eviction victim a
/// first-entry lookup.
#[derive(Debug, Clone)]
pub struct LruCache<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, CacheEntry<V>>,
    recency: BTreeMap<u64, K>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl<K: Ord + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl<K: Ord + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            recency: BTreeMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock = self.clock.saturating_add(1);
        self.clock
    }

    /// Look up a value and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.tick();
        let Some(entry) = self.entries.get_mut(key) else {
            self.misses = self.misses.saturating_add(1);
            return None;
        };
        self.recency.remove(&entry.last_access);
        entry.last_access = now;
        self.recency.insert(now, key.clone());
        self.hits = self.hits.saturating_add(1);
        Some(entry.value.clone())
    }

    /// Look up without touching recency or statistics.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Insert or replace a value, evicting the least recently used entry
    /// when full.
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.last_access);
            entry.value = value;
            entry.last_access = now;
            self.recency.insert(now, key);
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some((_, victim)) = self.recency.pop_first() {
                self.entries.remove(&victim);
            }
        }

        self.recency.insert(now, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: now,
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits.saturating_add(self.misses);
        let hit_rate_percent = if total == 0 {
            0
        } else {
            (self.hits.saturating_mul(100) / total) as u8
        };
        CacheStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate_percent,
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Integer percentage, 0-100.
    pub hit_rate_percent: u8,
}

/// Key under which a query embedding is cached: trimmed, lower-cased,
/// inner whitespace collapsed.
#[must_use]
pub fn query_key(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        let _ = cache.get(&"a");
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&"a"), Some(&10));
        assert!(cache.contains(&"b"));
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let mut cache = LruCache::new(4);
        cache.insert(1u32, "x");
        let _ = cache.get(&1);
        let _ = cache.get(&2);
        let _ = cache.peek(&3);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.hit_rate_percent), (1, 1, 50));
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut cache = LruCache::new(0);
        cache.insert(1u8, 1u8);
        cache.insert(2u8, 2u8);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&2));
    }

    #[test]
    fn query_key_folds_case_and_spacing() {
        assert_eq!(query_key("  MIG   Torch 500 A "), "mig torch 500 a");
    }
}
