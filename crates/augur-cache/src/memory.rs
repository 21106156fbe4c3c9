use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;

/// What a hot entry holds: one cache key, or a whole per-symbol snapshot.
/// Both are scoped by the optional `as_of` date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HotKey {
    Entry { key: String, as_of: Option<String> },
    Snapshot { symbol: String, as_of: Option<String> },
}

impl HotKey {
    pub fn entry(key: &str, as_of: Option<&str>) -> Self {
        Self::Entry {
            key: key.to_string(),
            as_of: as_of.map(str::to_string),
        }
    }

    pub fn snapshot(symbol: &str, as_of: Option<&str>) -> Self {
        Self::Snapshot {
            symbol: symbol.to_string(),
            as_of: as_of.map(str::to_string),
        }
    }
}

/// Parsed JSON kept in moka so agents reading the same symbol share one
/// SQLite read and one parse.
pub struct HotCache {
    inner: Cache<HotKey, Arc<Value>>,
}

impl HotCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &HotKey) -> Option<Arc<Value>> {
        self.inner.get(key).await
    }

    /// Store `value` and hand back the shared copy.
    pub async fn put(&self, key: HotKey, value: Value) -> Arc<Value> {
        let value = Arc::new(value);
        self.inner.insert(key, Arc::clone(&value)).await;
        value
    }

    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn entries_and_snapshots_do_not_collide() {
        let cache = HotCache::new(100, Duration::from_secs(60));
        cache
            .put(HotKey::entry("600519", None), json!({"price": 1688.0}))
            .await;
        cache
            .put(HotKey::snapshot("600519", None), json!({"quote:600519": {}}))
            .await;

        let entry = cache.get(&HotKey::entry("600519", None)).await.unwrap();
        assert_eq!(entry["price"], json!(1688.0));
        let snapshot = cache.get(&HotKey::snapshot("600519", None)).await.unwrap();
        assert!(snapshot.get("quote:600519").is_some());
        assert_eq!(cache.entry_count().await, 2);
    }

    #[tokio::test]
    async fn as_of_scopes_the_key() {
        let cache = HotCache::new(100, Duration::from_secs(60));
        cache
            .put(HotKey::snapshot("000001", Some("2026-01-05")), json!({}))
            .await;

        assert!(cache.get(&HotKey::snapshot("000001", None)).await.is_none());
        assert!(cache
            .get(&HotKey::snapshot("000001", Some("2026-01-05")))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = HotCache::new(100, Duration::from_millis(50));
        cache.put(HotKey::entry("k", None), json!(1)).await;
        assert!(cache.get(&HotKey::entry("k", None)).await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get(&HotKey::entry("k", None)).await.is_none());
    }
}
