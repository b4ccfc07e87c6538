//! Cache entries and their size accounting.
//! An entry's size is the JSON byte length of its persisted form
//! `{"result": .., "timestamp": ..}`, computed once at construction.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::TranslateOutcome;

/// Persisted representation of a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub result: TranslateOutcome,
    /// Insertion time, epoch milliseconds.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

/// Fractional timestamps written by other producers are truncated to whole ms.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    number_to_ms(&raw).ok_or_else(|| serde::de::Error::custom("timestamp is not a number"))
}

fn number_to_ms(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|t| t.trunc() as i64))
}

/// Timestamp of a raw stored value, if it has a numeric one.
pub fn timestamp_of(value: &Value) -> Option<i64> {
    value.get("timestamp").and_then(number_to_ms)
}

/// Borrowed view with the same wire shape as `StoredEntry`.
#[derive(Serialize)]
struct StoredRef<'a> {
    result: &'a TranslateOutcome,
    timestamp: i64,
}

/// Serialized byte size of an entry's storable representation.
pub fn size_of(result: &TranslateOutcome, timestamp: i64) -> Result<usize, serde_json::Error> {
    serde_json::to_vec(&StoredRef { result, timestamp }).map(|bytes| bytes.len())
}

/// Size of a raw value read back from the persistent store.
pub fn raw_size_of(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// `age > ttl` means logically absent.
#[inline]
pub fn is_expired(created_at: i64, now: i64, ttl_ms: i64) -> bool {
    now.saturating_sub(created_at) > ttl_ms
}

/// Memory-tier entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: TranslateOutcome,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Build a fresh entry. Size is measured here and never recomputed.
    pub fn new(result: TranslateOutcome, created_at: i64) -> Result<Self, serde_json::Error> {
        let size_bytes = size_of(&result, created_at)?;
        Ok(Self {
            result,
            created_at,
            last_accessed_at: created_at,
            size_bytes,
        })
    }

    /// Rebuild an entry read from the persistent tier, accessed at `now`.
    pub fn from_stored(stored: StoredEntry, now: i64) -> Result<Self, serde_json::Error> {
        let mut entry = Self::new(stored.result, stored.timestamp)?;
        entry.last_accessed_at = now;
        Ok(entry)
    }

    pub fn is_expired(&self, now: i64, ttl_ms: i64) -> bool {
        is_expired(self.created_at, now, ttl_ms)
    }

    /// Persisted form, ready for the store.
    pub fn to_stored_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(StoredRef {
            result: &self.result,
            timestamp: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_persisted_json() {
        let entry = CacheEntry::new(TranslateOutcome::translated("bonjour", "gemini"), 42).unwrap();
        let value = entry.to_stored_value().unwrap();
        assert_eq!(entry.size_bytes, raw_size_of(&value));
        assert_eq!(
            entry.size_bytes,
            r#"{"result":{"success":true,"translatedText":"bonjour","service":"gemini"},"timestamp":42}"#.len()
        );
    }

    #[test]
    fn size_counts_bytes_not_chars() {
        let ascii = CacheEntry::new(TranslateOutcome::translated("aa", "x"), 0).unwrap();
        let wide = CacheEntry::new(TranslateOutcome::translated("éé", "x"), 0).unwrap();
        assert_eq!(wide.size_bytes, ascii.size_bytes + 2);
    }

    #[test]
    fn expiry_is_strictly_greater_than_ttl() {
        assert!(!is_expired(0, 1000, 1000));
        assert!(is_expired(0, 1001, 1000));
    }

    #[test]
    fn fractional_timestamps_are_truncated() {
        let raw = serde_json::json!({
            "result": {"success": true, "translatedText": "hola"},
            "timestamp": 1700000000123.75
        });
        let stored: StoredEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(stored.timestamp, 1_700_000_000_123);
        assert_eq!(timestamp_of(&raw), Some(1_700_000_000_123));

        assert_eq!(timestamp_of(&serde_json::json!({"timestamp": "yesterday"})), None);
        assert_eq!(timestamp_of(&serde_json::json!({"result": {}})), None);
        let bad = serde_json::json!({"result": {"success": true}, "timestamp": "x"});
        assert!(serde_json::from_value::<StoredEntry>(bad).is_err());
    }

    #[test]
    fn stored_round_trip_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "result": {"success": true, "translatedText": "hola", "model": "gemini-pro"},
            "timestamp": 7
        });
        let stored: StoredEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(stored.result.extra.get("model").and_then(|v| v.as_str()), Some("gemini-pro"));

        let entry = CacheEntry::from_stored(stored, 99).unwrap();
        assert_eq!(entry.created_at, 7);
        assert_eq!(entry.last_accessed_at, 99);
        assert_eq!(entry.to_stored_value().unwrap(), raw);
    }
}
