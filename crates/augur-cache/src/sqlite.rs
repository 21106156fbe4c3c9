use augur_models::cache_schema::{CacheRow, CACHE_TABLE_DDL};
use chrono::Utc;
use rusqlite::{Connection, Row};

use crate::error::CacheError;

const SELECT_COLUMNS: &str =
    "SELECT key, as_of, category, value_json, source, symbol, created_at, expires_at, updated_at \
     FROM cache_entries";

/// Read-only SQLite cache accessor.
///
/// The shared database is written by an external data pipeline and only read
/// here. `as_of = None` addresses the latest rows (stored with an empty
/// `as_of`), `Some(date)` addresses a point-in-time snapshot.
pub struct SqliteReader {
    conn: Connection,
}

impl SqliteReader {
    /// Open a read-only connection to the shared cache database.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database with the schema applied. Writable so tests can seed it.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get a single non-expired entry.
    pub fn get(&self, key: &str, as_of: Option<&str>) -> Result<Option<CacheRow>, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE key = ?1 AND as_of = ?2 AND expires_at > ?3"
        ))?;

        let result = stmt.query_row(
            rusqlite::params![key, as_of.unwrap_or_default(), now],
            map_row,
        );

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Sqlite(e)),
        }
    }

    /// Get all non-expired entries for a symbol.
    pub fn get_by_symbol(
        &self,
        symbol: &str,
        as_of: Option<&str>,
    ) -> Result<Vec<CacheRow>, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE symbol = ?1 AND as_of = ?2 AND expires_at > ?3"
        ))?;

        let rows = stmt
            .query_map(
                rusqlite::params![symbol, as_of.unwrap_or_default(), now],
                map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Insert or replace an entry. Production data arrives from the pipeline;
    /// this exists for tests and fixtures.
    pub fn insert(&self, row: &CacheRow) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, as_of, category, value_json, source, symbol, created_at, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                row.key,
                row.as_of.as_deref().unwrap_or_default(),
                row.category,
                row.value_json,
                row.source,
                row.symbol,
                row.created_at,
                row.expires_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    let as_of: String = row.get(1)?;
    Ok(CacheRow {
        key: row.get(0)?,
        as_of: if as_of.is_empty() { None } else { Some(as_of) },
        category: row.get(2)?,
        value_json: row.get(3)?,
        source: row.get(4)?,
        symbol: row.get(5)?,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
