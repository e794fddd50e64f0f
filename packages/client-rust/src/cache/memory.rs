//! Bounded, optionally TTL'd in-memory cache backed by [`DashMap`].
//!
//! Reads and writes are lock-free for concurrent callers. When the entry
//! count reaches the configured bound, the cache samples a handful of random
//! entries (reservoir sampling) and evicts the least recently accessed one --
//! an approximation of LRU that needs no global ordering structure.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rand::Rng;

use depot_core::clock::now_millis;
use depot_core::{StoreKey, StoreValue};

use super::entry::{CacheEntry, EntryMetadata};

/// Configuration for the memory cache, all knobs optional.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction triggers. 0 = unbounded.
    pub max_entry_count: u64,
    /// Per-entry time-to-live in milliseconds from creation. 0 = no TTL.
    pub ttl_millis: u64,
    /// Maximum idle time in milliseconds since last access. 0 = no max idle.
    pub max_idle_millis: u64,
    /// Number of random entries examined per eviction.
    pub eviction_sample_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entry_count: 10_000,
            ttl_millis: 0,
            max_idle_millis: 0,
            eviction_sample_count: 8,
        }
    }
}

/// Snapshot of cache effectiveness counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that found nothing acceptable.
    pub misses: u64,
    /// Current number of entries.
    pub entry_count: usize,
}

/// Bounded mapping from key to the most recent domain value.
///
/// Thread-safe and advisory: a miss is an answer, never a failure. Expiry is
/// checked on read; capacity is enforced on write via sampling eviction.
pub struct MemoryCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> MemoryCache<K, V>
where
    K: StoreKey,
    V: StoreValue,
{
    /// Creates an empty cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up `key`, updating access metadata on a hit.
    ///
    /// Expired entries are removed and reported as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = now_millis();

        let expired = {
            if let Some(mut entry) = self.entries.get_mut(key) {
                if Self::is_expired(&entry.metadata, &self.config, now) {
                    true
                } else {
                    entry.metadata.on_access(now);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or replaces the value for `key`, evicting if at capacity.
    pub fn put(&self, key: K, value: V) {
        let now = now_millis();

        if self.config.max_entry_count > 0
            && !self.entries.contains_key(&key)
            && self.entries.len() as u64 >= self.config.max_entry_count
        {
            self.evict_one(now);
        }

        self.entries.insert(key, CacheEntry::new(value, now));
    }

    /// Drops the entry for `key`, if present.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drops every entry.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Current number of entries, including not-yet-collected expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len(),
        }
    }

    /// Checks TTL and max-idle expiry against config.
    #[allow(clippy::cast_possible_wrap)]
    fn is_expired(metadata: &EntryMetadata, config: &CacheConfig, now: i64) -> bool {
        // Config values are reasonable millisecond durations, not near u64::MAX.
        if config.ttl_millis > 0 && now - metadata.created_at > config.ttl_millis as i64 {
            return true;
        }
        if config.max_idle_millis > 0
            && now - metadata.last_access_at > config.max_idle_millis as i64
        {
            return true;
        }
        false
    }

    /// Evicts the least recently accessed entry among a random sample.
    fn evict_one(&self, now: i64) {
        let samples = self.sample_recency(self.config.eviction_sample_count.max(1));

        // Prefer an already-expired sample; otherwise take the stalest.
        let victim = samples
            .iter()
            .find(|(key, _)| {
                self.entries
                    .get(key)
                    .is_some_and(|e| Self::is_expired(&e.metadata, &self.config, now))
            })
            .or_else(|| samples.iter().min_by_key(|(_, last_access)| *last_access))
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    /// Returns up to `sample_count` random `(key, last_access_at)` pairs via
    /// reservoir sampling.
    fn sample_recency(&self, sample_count: usize) -> Vec<(K, i64)> {
        let mut rng = rand::rng();
        let mut reservoir: Vec<(K, i64)> = Vec::with_capacity(sample_count);

        for (i, entry) in self.entries.iter().enumerate() {
            let pair = (entry.key().clone(), entry.value().metadata.last_access_at);
            if i < sample_count {
                reservoir.push(pair);
            } else {
                // Replace an existing sample with probability sample_count / (i + 1)
                let j = rng.random_range(0..=i);
                if j < sample_count {
                    reservoir[j] = pair;
                }
            }
        }

        reservoir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache_with(config: CacheConfig) -> MemoryCache<u32, String> {
        MemoryCache::new(config)
    }

    #[test]
    fn put_get_invalidate_round_trip() {
        let cache = cache_with(CacheConfig::default());

        assert!(cache.get(&1).is_none());
        cache.put(1, "one".to_string());
        assert_eq!(cache.get(&1).as_deref(), Some("one"));

        cache.invalidate(&1);
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn invalidate_all_empties_cache() {
        let cache = cache_with(CacheConfig::default());
        cache.put(1, "a".to_string());
        cache.put(2, "b".to_string());
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = cache_with(CacheConfig {
            ttl_millis: 20,
            ..CacheConfig::default()
        });

        cache.put(1, "soon gone".to_string());
        assert!(cache.get(&1).is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&1).is_none());
        // The expired entry was removed, not just hidden.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn max_idle_expires_untouched_entries() {
        let cache = cache_with(CacheConfig {
            max_idle_millis: 20,
            ..CacheConfig::default()
        });

        cache.put(1, "idle".to_string());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn capacity_bound_holds_under_inserts() {
        let cache = cache_with(CacheConfig {
            max_entry_count: 4,
            // Sample everything so eviction is exact LRU for this test.
            eviction_sample_count: 64,
            ..CacheConfig::default()
        });

        for i in 0..20 {
            cache.put(i, format!("value-{i}"));
        }
        assert!(cache.len() <= 4);
    }

    #[test]
    fn eviction_prefers_least_recently_accessed() {
        let cache = cache_with(CacheConfig {
            max_entry_count: 3,
            eviction_sample_count: 64,
            ..CacheConfig::default()
        });

        cache.put(1, "a".to_string());
        cache.put(2, "b".to_string());
        cache.put(3, "c".to_string());

        // Touch 1 and 2 so 3 is the stalest; timestamps are millis, so force
        // distinct access times.
        std::thread::sleep(Duration::from_millis(5));
        cache.get(&1);
        cache.get(&2);

        cache.put(4, "d".to_string());
        assert!(cache.get(&3).is_none());
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&2).is_some());
        assert!(cache.get(&4).is_some());
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let cache = cache_with(CacheConfig {
            max_entry_count: 2,
            eviction_sample_count: 64,
            ..CacheConfig::default()
        });

        cache.put(1, "a".to_string());
        cache.put(2, "b".to_string());
        cache.put(1, "a2".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1).as_deref(), Some("a2"));
        assert_eq!(cache.get(&2).as_deref(), Some("b"));
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = cache_with(CacheConfig::default());
        cache.put(1, "a".to_string());

        cache.get(&1);
        cache.get(&1);
        cache.get(&2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }
}
