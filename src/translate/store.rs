//! Persistent key/value store adapter (L2 interface) and an in-process
//! implementation with an optional byte quota.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use super::entry::raw_size_of;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {used} + {requested} > {quota} bytes")]
    QuotaExceeded {
        used: usize,
        requested: usize,
        quota: usize,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable, quota-limited key/value store. Every call may suspend and may fail;
/// callers treat failures as misses or log them.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Values for the keys that exist; absent keys are simply missing from the map.
    async fn get_many(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>>;

    /// Every stored pair whose key starts with `prefix`.
    async fn get_all(&self, prefix: &str) -> StoreResult<HashMap<String, Value>>;

    async fn set_one(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove the given keys. Missing keys are not an error.
    async fn remove_many(&self, keys: &[String]) -> StoreResult<()>;
}

/// In-process store. Useful without a disk and as the test double for L2.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once the serialized values would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get_many(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>> {
        let data = self.data.lock();
        Ok(keys
            .iter()
            .filter_map(|k| data.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn get_all(&self, prefix: &str) -> StoreResult<HashMap<String, Value>> {
        let data = self.data.lock();
        Ok(data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set_one(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut data = self.data.lock();
        if let Some(quota) = self.quota_bytes {
            let requested = raw_size_of(&value);
            let used: usize = data
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| raw_size_of(v))
                .sum();
            if used + requested > quota {
                return Err(StoreError::QuotaExceeded {
                    used,
                    requested,
                    quota,
                });
            }
        }
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        let mut data = self.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}
