//! # LRU Cache
//!
//! Bounded least-recently-used cache used in front of the session table.
//!
//! Recency is tracked with a logical clock (a monotonic counter) rather than
//! wall time, so eviction order depends only on the sequence of accesses.
//! When full, the cache evicts a batch of the oldest entries at once.

use std::collections::BTreeMap;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Default maximum cache size.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Default eviction batch size (number of entries to evict at once).
pub const DEFAULT_EVICTION_BATCH: usize = 64;

// =============================================================================
// CACHE ENTRY
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    /// Logical timestamp of last access.
    last_access: u64,
}

// =============================================================================
// LRU CACHE
// =============================================================================

/// LRU cache keyed by any ordered key.
#[derive(Debug)]
pub struct LruCache<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, CacheEntry<V>>,
    max_size: usize,
    eviction_batch: usize,
    logical_clock: u64,
    hits: u64,
    misses: u64,
}

impl<K: Ord + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl<K: Ord + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `max_size` entries (minimum 1).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: BTreeMap::new(),
            max_size,
            eviction_batch: DEFAULT_EVICTION_BATCH.min(max_size),
            logical_clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Set how many entries are evicted when the cache is full.
    #[must_use]
    pub fn with_eviction_batch(mut self, batch_size: usize) -> Self {
        self.eviction_batch = batch_size.max(1);
        self
    }

    fn tick(&mut self) -> u64 {
        self.logical_clock = self.logical_clock.saturating_add(1);
        self.logical_clock
    }

    /// Get a clone of a value, marking it as recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let timestamp = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = timestamp;
            self.hits = self.hits.saturating_add(1);
            Some(entry.value.clone())
        } else {
            self.misses = self.misses.saturating_add(1);
            None
        }
    }

    /// Look at a value without touching recency or statistics.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Insert or replace a value, evicting old entries if full.
    pub fn insert(&mut self, key: K, value: V) {
        let timestamp = self.tick();

        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: timestamp,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.entries.retain(|k, e| keep(k, &e.value));
    }

    /// Drop every entry. Statistics and the clock are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
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
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            hit_rate_percent,
        }
    }

    /// Evict the `eviction_batch` least recently used entries.
    fn evict(&mut self) {
        let to_evict = self.eviction_batch.min(self.entries.len());
        if to_evict == 0 {
            return;
        }

        let mut by_access: Vec<(u64, K)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.last_access, k.clone()))
            .collect();
        by_access.sort_by_key(|(access, _)| *access);

        for (_, key) in by_access.into_iter().take(to_evict) {
            self.entries.remove(&key);
        }
    }
}

// =============================================================================
// CACHE STATISTICS
// =============================================================================

/// Cache performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Integer percentage, 0-100.
    pub hit_rate_percent: u8,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_insert_and_get() {
        let mut cache = LruCache::new(10);
        cache.insert("a".to_string(), 1u32);
        cache.insert("b".to_string(), 2u32);

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), None);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let mut cache = LruCache::new(3).with_eviction_batch(1);

        cache.insert(1u64, "a");
        cache.insert(2u64, "b");
        cache.insert(3u64, "c");

        // Touch 1 and 2 so 3 becomes the LRU entry
        let _ = cache.get(&1);
        let _ = cache.get(&2);

        cache.insert(4u64, "d");

        assert!(cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(!cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn batch_eviction_frees_several_slots() {
        let mut cache = LruCache::new(4).with_eviction_batch(2);
        for i in 0..4u64 {
            cache.insert(i, i);
        }
        cache.insert(10, 10);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&0));
        assert!(!cache.contains(&1));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let mut cache = LruCache::new(2).with_eviction_batch(1);
        cache.insert(1u64, "old");
        cache.insert(2u64, "b");
        cache.insert(1u64, "new");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&1), Some(&"new"));
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let mut cache = LruCache::<u64, &str>::new(10);

        cache.insert(1, "a");
        let _ = cache.get(&1);
        let _ = cache.get(&2);
        let _ = cache.peek(&3);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate_percent, 50);
    }

    #[test]
    fn retain_filters_by_value() {
        let mut cache = LruCache::new(10);
        cache.insert(1u64, 100u64);
        cache.insert(2u64, 200u64);
        cache.insert(3u64, 100u64);

        cache.retain(|_, owner| *owner != 100);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&2));

        cache.clear();
        assert!(cache.is_empty());
    }
}
