use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::CacheError;
use crate::memory::{HotCache, HotKey};
use crate::sqlite::SqliteReader;

/// Read-through cache: checks moka (hot) → SQLite (shared) → None.
///
/// SQLite hits are promoted to moka. The SQLite file is written by external
/// data pipelines; this side never writes it.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct CacheReader {
    memory: HotCache,
    sqlite: Mutex<SqliteReader>,
}

impl CacheReader {
    pub fn new(sqlite: SqliteReader, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: HotCache::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    /// Get a typed value by cache key.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        as_of: Option<&str>,
    ) -> Result<Option<T>, CacheError> {
        let hot_key = HotKey::entry(key, as_of);
        if let Some(value) = self.memory.get(&hot_key).await {
            return Ok(Some(<T as Deserialize>::deserialize(value.as_ref())?));
        }

        // TTL filtering happens in the query
        let row = {
            let sqlite = self.lock()?;
            sqlite.get(key, as_of)?
        };

        match row {
            Some(row) => {
                let value: serde_json::Value = serde_json::from_str(&row.value_json)?;
                let value = self.memory.put(hot_key, value).await;
                Ok(Some(<T as Deserialize>::deserialize(value.as_ref())?))
            }
            None => Ok(None),
        }
    }

    /// Build a data snapshot for a symbol: every live entry merged into one
    /// JSON object keyed by cache key. Rows with malformed JSON are skipped.
    pub async fn snapshot(
        &self,
        symbol: &str,
        as_of: Option<&str>,
    ) -> Result<serde_json::Value, CacheError> {
        let hot_key = HotKey::snapshot(symbol, as_of);
        if let Some(snapshot) = self.memory.get(&hot_key).await {
            return Ok(snapshot.as_ref().clone());
        }

        let rows = {
            let sqlite = self.lock()?;
            sqlite.get_by_symbol(symbol, as_of)?
        };

        let mut map = serde_json::Map::new();
        for row in rows {
            match serde_json::from_str::<serde_json::Value>(&row.value_json) {
                Ok(value) => {
                    map.insert(row.key, value);
                }
                Err(e) => debug!(key = %row.key, error = %e, "Skipping malformed cache row"),
            }
        }

        let snapshot = serde_json::Value::Object(map);
        self.memory.put(hot_key, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Number of entries in the hot moka cache.
    pub async fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count().await
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SqliteReader>, CacheError> {
        self.sqlite
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}
