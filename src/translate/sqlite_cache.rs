//! L2 persistent store backed by SQLite.
//! A plain key/value table holding the JSON form of each cache entry; the
//! coordinator owns expiry, this layer only stores and scans.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use super::store::{PersistentStore, StoreResult};

/// SQLite-backed key/value store (L2).
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the SQLite store at the given path.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn)?;

        info!(path = %db_path.display(), "SQLite L2 store opened");
        Ok(store)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get_many(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>> {
        let keys = keys.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached("SELECT value FROM kv_store WHERE key = ?1")?;
            let mut out = HashMap::with_capacity(keys.len());
            for key in keys {
                let raw: Option<String> = stmt
                    .query_row(params![key], |row| row.get(0))
                    .optional()?;
                if let Some(raw) = raw {
                    let value = decode(&key, raw);
                    out.insert(key, value);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn get_all(&self, prefix: &str) -> StoreResult<HashMap<String, Value>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT key, value FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
            )?;
            let rows = stmt.query_map(params![prefix], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut out = HashMap::new();
            for row in rows {
                let (key, raw) = row?;
                let value = decode(&key, raw);
                out.insert(key, value);
            }
            Ok(out)
        })
        .await
    }

    async fn set_one(&self, key: &str, value: Value) -> StoreResult<()> {
        let key = key.to_string();
        let raw = serde_json::to_string(&value)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![key, raw, now_unix()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = keys.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM kv_store WHERE key = ?1")?;
                for key in &keys {
                    removed += stmt.execute(params![key])?;
                }
            }
            tx.commit()?;
            debug!(requested = keys.len(), removed, "L2 keys removed");
            Ok(())
        })
        .await
    }
}

/// Unparseable rows come back as raw strings so the caller can spot and drop them.
fn decode(key: &str, raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(key, error = %e, "L2 value is not valid JSON");
            Value::String(raw)
        }
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
