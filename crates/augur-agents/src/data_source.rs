use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use augur_cache::CacheReader;
use chrono::NaiveDate;

use crate::error::AgentError;

/// Where analysts read their inputs from.
///
/// A snapshot is one JSON object keyed by cache key (see
/// `augur_models::cache_schema::key_patterns`). Missing keys mean "no data",
/// which analysts treat as absent evidence rather than an error.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn snapshot(
        &self,
        symbol: &str,
        as_of: Option<NaiveDate>,
    ) -> Result<serde_json::Value, AgentError>;
}

#[async_trait]
impl DataSource for CacheReader {
    async fn snapshot(
        &self,
        symbol: &str,
        as_of: Option<NaiveDate>,
    ) -> Result<serde_json::Value, AgentError> {
        let as_of = as_of.map(|d| d.to_string());
        Ok(CacheReader::snapshot(self, symbol, as_of.as_deref()).await?)
    }
}

/// Fixed per-symbol snapshots, for fixtures and offline runs.
#[derive(Default)]
pub struct StaticDataSource {
    snapshots: RwLock<HashMap<String, serde_json::Value>>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(self, symbol: &str, snapshot: serde_json::Value) -> Self {
        self.set(symbol, snapshot);
        self
    }

    pub fn set(&self, symbol: &str, snapshot: serde_json::Value) {
        if let Ok(mut map) = self.snapshots.write() {
            map.insert(symbol.to_string(), snapshot);
        }
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn snapshot(
        &self,
        symbol: &str,
        _as_of: Option<NaiveDate>,
    ) -> Result<serde_json::Value, AgentError> {
        let map = self
            .snapshots
            .read()
            .map_err(|e| AgentError::Data(format!("snapshot lock poisoned: {e}")))?;
        Ok(map
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})))
    }
}

/// Last numeric reading at `data[key][field]`.
///
/// Accepts a plain number or a series (last element = most recent).
pub fn last_value(data: &serde_json::Value, key: &str, field: &str) -> Option<f64> {
    let value = data.get(key)?.get(field)?;
    match value {
        serde_json::Value::Array(series) => series.last().and_then(|v| v.as_f64()),
        other => other.as_f64(),
    }
}
