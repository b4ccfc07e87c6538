//! In-memory LRU translation cache (L1) with a byte-size bound and TTL.
//! Recency order is kept by an unbounded `LruCache`; capacity is enforced
//! here in bytes, evicting least-recently-used entries down to the
//! eviction target whenever the bound is crossed.

use lru::LruCache;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::fingerprint::CacheKey;
use crate::config::CacheConfig;

/// Result of probing the memory tier.
#[derive(Debug)]
pub enum Probe<'a> {
    Hit(&'a CacheEntry),
    /// Present but past its TTL; it has been dropped from memory.
    Expired,
    Absent,
}

pub struct MemoryLru {
    entries: LruCache<CacheKey, CacheEntry>,
    total_size: usize,
    capacity: usize,
    eviction_target: usize,
    ttl_ms: i64,
    insertions: u64,
    safety_check_interval: u64,
    /// Bumped on every clear; lets callers detect a clear that happened
    /// while they were suspended on the store.
    generation: u64,
}

impl MemoryLru {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_size: 0,
            capacity: config.max_size_bytes,
            eviction_target: config.eviction_target(),
            ttl_ms: config.ttl_ms(),
            insertions: 0,
            safety_check_interval: config.safety_check_interval,
            generation: 0,
        }
    }

    /// Look up `key` at time `now`. A live hit becomes most-recently-used.
    pub fn get(&mut self, key: &CacheKey, now: i64) -> Probe<'_> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(now, self.ttl_ms),
            None => return Probe::Absent,
        };

        if expired {
            self.remove(key);
            debug!(key = %key, "memory entry expired");
            return Probe::Expired;
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed_at = now;
                Probe::Hit(entry)
            }
            None => Probe::Absent,
        }
    }

    /// Insert or replace `key` as most-recently-used.
    /// Returns the keys evicted to get back under the eviction target.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Vec<CacheKey> {
        let size = entry.size_bytes;
        if let Some(old) = self.entries.put(key, entry) {
            self.total_size = self.total_size.saturating_sub(old.size_bytes);
        }
        self.total_size += size;
        self.insertions += 1;

        if self.total_size > self.capacity {
            debug!(
                total = self.total_size,
                capacity = self.capacity,
                "memory cache over capacity"
            );
            return self.evict_until_under_threshold();
        }

        if self.safety_check_interval > 0 && self.insertions % self.safety_check_interval == 0 {
            self.resync_total_size();
            if self.total_size > self.eviction_target {
                debug!(
                    total = self.total_size,
                    target = self.eviction_target,
                    "periodic size check triggered eviction"
                );
                return self.evict_until_under_threshold();
            }
        }

        Vec::new()
    }

    /// Pop least-recently-used entries, regardless of their size, until the
    /// total is at or under the eviction target or the cache is empty.
    pub fn evict_until_under_threshold(&mut self) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while self.total_size > self.eviction_target {
            match self.entries.pop_lru() {
                Some((key, entry)) => {
                    self.total_size = self.total_size.saturating_sub(entry.size_bytes);
                    evicted.push(key);
                }
                None => {
                    warn!(total = self.total_size, "size counter drifted on empty cache, resetting");
                    self.total_size = 0;
                    break;
                }
            }
        }
        evicted
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Empty the cache. Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.total_size = 0;
        self.invalidate();
        count
    }

    /// Start a new generation without touching the entries.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Membership test without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Keys from most- to least-recently-used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Recompute the total from the live entries.
    fn resync_total_size(&mut self) {
        let actual: usize = self.entries.iter().map(|(_, e)| e.size_bytes).sum();
        if actual != self.total_size {
            warn!(counted = self.total_size, actual, "memory cache size drift corrected");
            self.total_size = actual;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::TranslateOutcome;

    fn key(name: &str) -> CacheKey {
        CacheKey::from(format!("translation_cache_{name}"))
    }

    fn entry(text_len: usize, created_at: i64) -> CacheEntry {
        CacheEntry::new(TranslateOutcome::translated("x".repeat(text_len), "t"), created_at).unwrap()
    }

    fn config(max_size_bytes: usize) -> CacheConfig {
        CacheConfig {
            max_size_bytes,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn hit_marks_most_recently_used() {
        let mut cache = MemoryLru::new(&config(1 << 20));
        cache.put(key("a"), entry(10, 0));
        cache.put(key("b"), entry(10, 0));
        assert_eq!(cache.keys(), vec![key("b"), key("a")]);

        match cache.get(&key("a"), 5) {
            Probe::Hit(e) => assert_eq!(e.last_accessed_at, 5),
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(cache.keys(), vec![key("a"), key("b")]);
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let config = CacheConfig {
            ttl_secs: 1,
            ..config(1 << 20)
        };
        let mut cache = MemoryLru::new(&config);
        cache.put(key("a"), entry(10, 0));

        assert!(matches!(cache.get(&key("a"), 1000), Probe::Hit(_)));
        assert!(matches!(cache.get(&key("a"), 1001), Probe::Expired));
        assert!(matches!(cache.get(&key("a"), 1001), Probe::Absent));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn replace_adjusts_total_size() {
        let mut cache = MemoryLru::new(&config(1 << 20));
        cache.put(key("a"), entry(10, 0));
        let small = cache.total_size();
        cache.put(key("a"), entry(110, 0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_size(), small + 100);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let unit = entry(100, 0).size_bytes;
        // Room for exactly three entries.
        let mut cache = MemoryLru::new(&config(unit * 3));
        cache.put(key("a"), entry(100, 0));
        cache.put(key("b"), entry(100, 0));
        cache.put(key("c"), entry(100, 0));
        assert!(matches!(cache.get(&key("a"), 1), Probe::Hit(_)));

        let evicted = cache.put(key("d"), entry(100, 0));
        // Target is 90% of three units, so two entries have to go.
        assert_eq!(evicted, vec![key("b"), key("c")]);
        assert!(cache.contains(&key("a")));
        assert!(cache.contains(&key("d")));
        assert!(cache.total_size() <= unit * 3);
    }

    #[test]
    fn oversized_entry_empties_the_cache() {
        let mut cache = MemoryLru::new(&config(500));
        cache.put(key("a"), entry(10, 0));
        let evicted = cache.put(key("huge"), entry(1000, 0));
        assert_eq!(evicted, vec![key("a"), key("huge")]);
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn periodic_check_evicts_between_target_and_capacity() {
        let unit = entry(50, 0).size_bytes;
        // Capacity for ten units; the target (90%) is nine.
        let config = CacheConfig {
            safety_check_interval: 10,
            ..config(unit * 10)
        };
        let mut cache = MemoryLru::new(&config);
        for i in 0..9 {
            assert!(cache.put(key(&i.to_string()), entry(50, 0)).is_empty());
        }
        // Tenth insertion lands exactly on capacity: no breach, but over target.
        let evicted = cache.put(key("9"), entry(50, 0));
        assert_eq!(evicted, vec![key("0")]);
        assert_eq!(cache.total_size(), unit * 9);
    }

    #[test]
    fn threshold_above_one_still_respects_capacity() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"max_size_bytes": 1000, "eviction_threshold": 1.5}"#)
                .unwrap();
        let mut cache = MemoryLru::new(&config);
        for i in 0..20 {
            cache.put(key(&i.to_string()), entry(20, 0));
            assert!(cache.total_size() <= 1000, "total {} after put {i}", cache.total_size());
        }
        assert!(!cache.is_empty());
    }

    #[test]
    fn clear_reports_count() {
        let mut cache = MemoryLru::new(&config(1 << 20));
        cache.put(key("a"), entry(1, 0));
        cache.put(key("b"), entry(1, 0));
        let generation = cache.generation();
        assert_eq!(cache.clear(), 2);
        assert_ne!(cache.generation(), generation);
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
    }
}
