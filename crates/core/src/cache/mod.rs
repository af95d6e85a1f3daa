//! Keyed result cache with an explicit staleness policy.
//!
//! Results are cached by (plate, state). Staleness is decided at read time
//! against the configured TTL, so a stale row is simply not returned; it is
//! overwritten by the next successful lookup.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::debug;

use crate::violation::{EnhancedResult, Query};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for result cache backends.
pub trait ResultCache: Send + Sync {
    /// Upsert the result for its query key.
    fn put(&self, result: &EnhancedResult) -> Result<(), CacheError>;

    /// Fetch a result younger than the TTL, or None.
    fn get(&self, query: &Query) -> Result<Option<EnhancedResult>, CacheError>;

    /// Delete entries older than the TTL. Returns the number removed.
    fn purge_expired(&self) -> Result<usize, CacheError>;
}

/// SQLite-backed result cache.
pub struct SqliteResultCache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteResultCache {
    /// Open (or create) the cache at the given path.
    pub fn new(path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory(ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cached_results (
                plate TEXT NOT NULL,
                state TEXT NOT NULL,
                result TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (plate, state)
            );
            "#,
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero())
    }
}

impl ResultCache for SqliteResultCache {
    fn put(&self, result: &EnhancedResult) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();

        let json =
            serde_json::to_string(result).map_err(|e| CacheError::Database(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO cached_results (plate, state, result, stored_at) VALUES (?, ?, ?, ?)",
            params![
                result.query.license_plate,
                result.query.state,
                json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(())
    }

    fn get(&self, query: &Query) -> Result<Option<EnhancedResult>, CacheError> {
        let conn = self.conn.lock().unwrap();

        let row = conn.query_row(
            "SELECT result, stored_at FROM cached_results WHERE plate = ? AND state = ?",
            params![query.license_plate, query.state],
            |row| {
                let result: String = row.get(0)?;
                let stored_at: String = row.get(1)?;
                Ok((result, stored_at))
            },
        );

        let (json, stored_at) = match row {
            Ok(pair) => pair,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(CacheError::Database(e.to_string())),
        };

        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CacheError::Database(format!("stored_at: {}", e)))?;

        if stored_at < self.cutoff() {
            debug!(query = %query, "Cached result is stale");
            return Ok(None);
        }

        let result: EnhancedResult =
            serde_json::from_str(&json).map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(Some(result))
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM cached_results WHERE stored_at < ?",
                params![self.cutoff().to_rfc3339()],
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{Query, ResultMetadata};

    fn result(plate: &str) -> EnhancedResult {
        EnhancedResult {
            query: Query::new(plate, "NY").unwrap(),
            violations: vec![],
            metadata: ResultMetadata {
                completeness: 1.0,
                processing_time_secs: 0.5,
                data_sources: vec!["open_data".into()],
                downloaded_images: 0,
            },
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let cache = SqliteResultCache::in_memory(Duration::from_secs(60)).unwrap();
        let r = result("ABC1234");
        cache.put(&r).unwrap();

        let fetched = cache.get(&r.query).unwrap().unwrap();
        assert_eq!(fetched, r);
    }

    #[test]
    fn test_get_miss() {
        let cache = SqliteResultCache::in_memory(Duration::from_secs(60)).unwrap();
        let query = Query::new("MISSING1", "NY").unwrap();
        assert!(cache.get(&query).unwrap().is_none());
    }

    #[test]
    fn test_put_upserts() {
        let cache = SqliteResultCache::in_memory(Duration::from_secs(60)).unwrap();
        let mut r = result("ABC1234");
        cache.put(&r).unwrap();

        r.metadata.downloaded_images = 5;
        cache.put(&r).unwrap();

        let fetched = cache.get(&r.query).unwrap().unwrap();
        assert_eq!(fetched.metadata.downloaded_images, 5);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = SqliteResultCache::in_memory(Duration::from_secs(0)).unwrap();
        let r = result("ABC1234");
        cache.put(&r).unwrap();
        assert!(cache.get(&r.query).unwrap().is_none());
    }

    #[test]
    fn test_purge_expired_removes_stale_rows() {
        let cache = SqliteResultCache::in_memory(Duration::from_secs(0)).unwrap();
        cache.put(&result("ABC1234")).unwrap();
        cache.put(&result("XYZ9999")).unwrap();
        assert_eq!(cache.purge_expired().unwrap(), 2);
        assert_eq!(cache.purge_expired().unwrap(), 0);
    }
}
