//! Two-tier cache coordinator: memory LRU (L1) in front of a persistent store (L2).
//!
//! The memory tier is mutated only inside short synchronous blocks; the lock is
//! never held across an `.await`, so memory-only sequences are atomic with
//! respect to other in-flight requests. Store calls are the suspension points,
//! and every store failure is logged and degraded to a miss or a no-op.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{MemoryLru, Probe};
use super::entry::{is_expired, raw_size_of, timestamp_of, CacheEntry, StoredEntry};
use super::fingerprint::{fingerprint_with_prefix, CacheKey};
use super::store::PersistentStore;
use super::{BackendPreference, TranslateOutcome};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::state_machine::{LookupState, LookupTrace};

const MIB: f64 = 1024.0 * 1024.0;

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Memory,
    Storage,
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub result: TranslateOutcome,
    pub tier: Tier,
    pub created_at: i64,
}

/// Snapshot across both tiers. Field names follow the extension's wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub memory_entries: usize,
    pub storage_entries: usize,
    pub total_size_bytes: usize,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    #[serde(rename = "memorySizeMB")]
    pub memory_size_mb: f64,
    #[serde(rename = "storageSizeMB")]
    pub storage_size_mb: f64,
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: f64,
    #[serde(rename = "cacheTTLDays")]
    pub cache_ttl_days: f64,
    pub usage_percent: f64,
}

pub struct TieredCache {
    memory: Mutex<MemoryLru>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsRegistry>,
    config: CacheConfig,
}

impl TieredCache {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        if let Err(e) = config.validate() {
            warn!(
                error = %e,
                target = config.eviction_target(),
                "cache config out of range, eviction target clamped to capacity"
            );
        }
        Self {
            memory: Mutex::new(MemoryLru::new(&config)),
            store,
            clock,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache key for a request under this cache's namespace.
    pub fn key_for(
        &self,
        text: &str,
        src_lang: &str,
        tgt_lang: &str,
        backend: BackendPreference,
    ) -> CacheKey {
        fingerprint_with_prefix(&self.config.key_prefix, text, src_lang, tgt_lang, backend.as_str())
    }

    /// Memory first, then the persistent tier. A live persistent hit is
    /// promoted into memory before returning. Expired entries are purged
    /// from both tiers and reported as absent.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheHit> {
        let span = self.metrics.span(metric_names::CACHE_LOOKUP);
        let mut trace = LookupTrace::start();
        let now = self.clock.now_ms();

        let memory_probe = {
            let mut memory = self.memory.lock();
            let probe = match memory.get(key, now) {
                Probe::Hit(entry) => Some(Some(CacheHit {
                    result: entry.result.clone(),
                    tier: Tier::Memory,
                    created_at: entry.created_at,
                })),
                Probe::Expired => Some(None),
                Probe::Absent => None,
            };
            probe
        };

        let hit = match memory_probe {
            Some(Some(hit)) => {
                self.metrics.incr(metric_names::MEMORY_HITS, 1);
                let _ = trace.advance(LookupState::Hit);
                Some(hit)
            }
            Some(None) => {
                self.metrics.incr(metric_names::EXPIRED, 1);
                self.remove_from_store(&[key.clone()], "expired").await;
                let _ = trace.advance(LookupState::Miss);
                None
            }
            None => {
                let _ = trace.advance(LookupState::StorageCheck);
                let hit = self.lookup_storage(key, now).await;
                let next = if hit.is_some() {
                    LookupState::Hit
                } else {
                    LookupState::Miss
                };
                let _ = trace.advance(next);
                hit
            }
        };

        if hit.is_none() {
            self.metrics.incr(metric_names::MISSES, 1);
        }
        debug!(
            key = %key,
            outcome = %trace.current(),
            storage = trace.visited_storage(),
            "cache_lookup"
        );
        span.finish();
        hit
    }

    async fn lookup_storage(&self, key: &CacheKey, now: i64) -> Option<CacheHit> {
        let raw_key = key.as_str().to_string();
        let generation = self.memory.lock().generation();
        let mut found = match self.store.get_many(std::slice::from_ref(&raw_key)).await {
            Ok(found) => found,
            Err(e) => {
                self.metrics.incr(metric_names::STORE_FAILURES, 1);
                warn!(key = %key, error = %e, "L2 read failed, treating as miss");
                return None;
            }
        };

        // A clear or a fresh store for this key may have landed while the
        // read was suspended. Memory is authoritative then; the read is stale.
        if self.superseded(key, generation) {
            debug!(key = %key, "L2 read superseded, answering from memory");
            return self.memory_hit(key, now);
        }

        let value = found.remove(&raw_key)?;

        let stored: StoredEntry = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "malformed L2 entry, removing");
                self.remove_from_store(&[key.clone()], "malformed").await;
                return None;
            }
        };

        if is_expired(stored.timestamp, now, self.config.ttl_ms()) {
            self.metrics.incr(metric_names::EXPIRED, 1);
            self.remove_from_store(&[key.clone()], "expired").await;
            return None;
        }

        let entry = match CacheEntry::from_stored(stored, now) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "L2 entry could not be sized, skipping promotion");
                return None;
            }
        };
        let hit = CacheHit {
            result: entry.result.clone(),
            tier: Tier::Storage,
            created_at: entry.created_at,
        };

        let evicted = self.memory.lock().put(key.clone(), entry);
        self.metrics.incr(metric_names::STORAGE_HITS, 1);
        debug!(key = %key, "L2 hit promoted to memory");
        self.discard_evicted(evicted).await;

        Some(hit)
    }

    /// Record a successful translation in both tiers. Never fails the caller:
    /// serialization and persistence errors are logged and dropped.
    pub async fn store(&self, key: &CacheKey, result: TranslateOutcome) {
        let span = self.metrics.span(metric_names::CACHE_STORE);
        let now = self.clock.now_ms();

        let entry = match CacheEntry::new(result, now) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "translation result not serializable, not cached");
                return;
            }
        };
        let value = match entry.to_stored_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "translation result not serializable, not cached");
                return;
            }
        };
        let size_bytes = entry.size_bytes;

        let evicted = self.memory.lock().put(key.clone(), entry);
        let self_evicted = evicted.contains(key);
        self.discard_evicted(evicted).await;

        if self_evicted {
            debug!(key = %key, size_bytes, "entry larger than cache target, not persisted");
        } else if let Err(e) = self.store.set_one(key.as_str(), value).await {
            self.metrics.incr(metric_names::STORE_FAILURES, 1);
            warn!(key = %key, error = %e, "L2 write failed, entry kept in memory only");
        }

        span.finish();
    }

    /// Run eviction on the memory tier now and mirror it to the store.
    /// Returns the number of entries evicted.
    pub async fn enforce_capacity(&self) -> usize {
        let evicted = self.memory.lock().evict_until_under_threshold();
        let count = evicted.len();
        self.discard_evicted(evicted).await;
        count
    }

    /// Counts and sizes across both tiers. Persistent entries without a
    /// timestamp are counted as stored but neither valid nor expired.
    pub async fn stats(&self) -> CacheStats {
        let span = self.metrics.span(metric_names::CACHE_STATS);
        let now = self.clock.now_ms();
        let ttl_ms = self.config.ttl_ms();

        let (memory_entries, memory_size) = {
            let memory = self.memory.lock();
            (memory.len(), memory.total_size())
        };

        let mut storage_entries = 0;
        let mut storage_size = 0;
        let mut valid_entries = 0;
        let mut expired_entries = 0;
        match self.store.get_all(&self.config.key_prefix).await {
            Ok(all) => {
                storage_entries = all.len();
                for value in all.values() {
                    let Some(timestamp) = timestamp_of(value) else {
                        continue;
                    };
                    storage_size += raw_size_of(value);
                    if is_expired(timestamp, now, ttl_ms) {
                        expired_entries += 1;
                    } else {
                        valid_entries += 1;
                    }
                }
            }
            Err(e) => {
                self.metrics.incr(metric_names::STORE_FAILURES, 1);
                warn!(error = %e, "L2 scan failed, stats reflect memory tier only");
            }
        }

        let total_size = storage_size.max(memory_size);
        let stats = CacheStats {
            total_entries: storage_entries.max(memory_entries),
            valid_entries,
            expired_entries,
            memory_entries,
            storage_entries,
            total_size_bytes: total_size,
            total_size_mb: round_to(total_size as f64 / MIB, 2),
            memory_size_mb: round_to(memory_size as f64 / MIB, 2),
            storage_size_mb: round_to(storage_size as f64 / MIB, 2),
            max_size_mb: round_to(self.config.max_size_bytes as f64 / MIB, 2),
            cache_ttl_days: round_to(self.config.ttl_secs as f64 / 86_400.0, 2),
            usage_percent: round_to(
                total_size as f64 / self.config.max_size_bytes as f64 * 100.0,
                1,
            ),
        };
        span.finish();
        stats
    }

    /// Drop everything in both tiers. Returns the larger of the two tiers'
    /// counts, not their union.
    pub async fn clear_all(&self) -> usize {
        let memory_count = self.memory.lock().clear();

        let storage_count = match self.store.get_all(&self.config.key_prefix).await {
            Ok(all) => {
                let keys: Vec<String> = all.into_keys().collect();
                if keys.is_empty() {
                    0
                } else {
                    match self.store.remove_many(&keys).await {
                        Ok(()) => keys.len(),
                        Err(e) => {
                            self.metrics.incr(metric_names::STORE_FAILURES, 1);
                            warn!(error = %e, "L2 clear failed");
                            0
                        }
                    }
                }
            }
            Err(e) => {
                self.metrics.incr(metric_names::STORE_FAILURES, 1);
                warn!(error = %e, "L2 scan failed during clear");
                0
            }
        };

        // Lookups that read the store before the removal finished must not
        // promote what they saw.
        self.memory.lock().invalidate();

        let cleared = memory_count.max(storage_count);
        info!(memory_count, storage_count, cleared, "cache cleared");
        cleared
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    pub fn memory_size(&self) -> usize {
        self.memory.lock().total_size()
    }

    pub fn in_memory(&self, key: &CacheKey) -> bool {
        self.memory.lock().contains(key)
    }

    fn superseded(&self, key: &CacheKey, generation: u64) -> bool {
        let memory = self.memory.lock();
        memory.generation() != generation || memory.contains(key)
    }

    fn memory_hit(&self, key: &CacheKey, now: i64) -> Option<CacheHit> {
        let mut memory = self.memory.lock();
        let hit = match memory.get(key, now) {
            Probe::Hit(entry) => Some(CacheHit {
                result: entry.result.clone(),
                tier: Tier::Memory,
                created_at: entry.created_at,
            }),
            Probe::Expired | Probe::Absent => None,
        };
        hit
    }

    async fn discard_evicted(&self, evicted: Vec<CacheKey>) {
        if evicted.is_empty() {
            return;
        }
        self.metrics.incr(metric_names::EVICTIONS, evicted.len() as u64);
        debug!(evicted = evicted.len(), "LRU eviction");
        self.remove_from_store(&evicted, "evicted").await;
    }

    /// Best-effort removal; failures are logged only.
    async fn remove_from_store(&self, keys: &[CacheKey], reason: &'static str) {
        let raw: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
        if let Err(e) = self.store.remove_many(&raw).await {
            self.metrics.incr(metric_names::STORE_FAILURES, 1);
            warn!(count = raw.len(), reason, error = %e, "L2 removal failed");
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
