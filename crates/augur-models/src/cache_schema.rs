use serde::{Deserialize, Serialize};

/// Categories for organizing data-source cache keys.
/// The external data pipeline uses these when writing to the shared SQLite cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    MarketData,
    Indicator,
    Fundamental,
    Sentiment,
    Policy,
    Risk,
}

/// The SQLite table the external pipeline writes and augur reads.
///
/// `as_of` is an ISO date for point-in-time snapshots, or `''` for the latest values.
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT NOT NULL,
    as_of       TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (key, as_of)
);
CREATE INDEX IF NOT EXISTS idx_cache_category ON cache_entries(category);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Key pattern conventions for the cache.
///
/// Agents look their inputs up by these keys, so pipelines writing the cache
/// must follow them:
///
/// - Quotes: `quote:{symbol}` → `{"price": 12.3, ...}`
/// - Indicators: `indicator:{name}:{symbol}` → `{"value": [..]}` or multi-series objects
/// - Fundamentals: `fundamental:{symbol}` → `{"roe": .., "pe": .., "pb": .., "debt_ratio": .., "revenue_growth": ..}`
/// - Sentiment: `sentiment:{source}:{symbol}` → `{"score": -1..1}`
/// - Policy: `policy:{symbol}` → `{"items": [{"headline": .., "impact": -1..1}]}`
/// - Risk: `risk:{symbol}` → `{"risk_score": -1..1, "halted": bool, ...}`
pub mod key_patterns {
    pub fn quote(symbol: &str) -> String {
        format!("quote:{symbol}")
    }

    pub fn indicator(name: &str, symbol: &str) -> String {
        format!("indicator:{name}:{symbol}")
    }

    pub fn fundamental(symbol: &str) -> String {
        format!("fundamental:{symbol}")
    }

    pub fn sentiment(source: &str, symbol: &str) -> String {
        format!("sentiment:{source}:{symbol}")
    }

    pub fn policy(symbol: &str) -> String {
        format!("policy:{symbol}")
    }

    pub fn risk(symbol: &str) -> String {
        format!("risk:{symbol}")
    }
}

/// A raw cache row as read from SQLite.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    /// None = latest snapshot.
    pub as_of: Option<String>,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
}
