//! # Thera Cache
//!
//! DuckDB-backed response cache for the thera data-access gateway.
//!
//! Entries are keyed by a request fingerprint and carry an absolute expiry in
//! epoch milliseconds. An entry whose expiry has passed is reported as a miss
//! even before [`ResponseCache::cleanup_expired`] removes it.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use thera_cache::ResponseCache;
//!
//! # fn main() -> Result<(), thera_cache::CacheError> {
//! let cache = ResponseCache::open_default()?;
//! cache.set("3f1c...", r#"{"ok":true}"#, Duration::from_secs(6 * 3600))?;
//! assert!(cache.get("3f1c...")?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod duckdb;
mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::duckdb::{Connection, ToSql};
use thiserror::Error;
use time::OffsetDateTime;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors raised by cache storage operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error while preparing the cache directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Location and pool settings for the persisted cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for thera data.
    pub thera_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl CacheConfig {
    /// Configuration rooted at an explicit home directory.
    pub fn with_home(thera_home: impl Into<PathBuf>) -> Self {
        let thera_home = thera_home.into();
        let db_path = thera_home.join("cache").join("api_cache.duckdb");
        Self {
            thera_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_home(resolve_thera_home())
    }
}

/// Entry counts reported by [`ResponseCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub total: u64,
    pub expired: u64,
    pub active: u64,
}

/// Persisted TTL cache of upstream response bodies.
#[derive(Clone)]
pub struct ResponseCache {
    manager: DuckDbConnectionManager,
}

impl ResponseCache {
    /// Open the cache at the default location (`$THERA_HOME/cache/api_cache.duckdb`).
    pub fn open_default() -> Result<Self, CacheError> {
        Self::open(CacheConfig::default())
    }

    /// Open the cache with the specified configuration, creating the parent
    /// directory and schema when missing.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let cache = Self { manager };
        cache.initialize()?;
        Ok(cache)
    }

    /// Open a cache backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let manager = DuckDbConnectionManager::open_in_memory(2)?;
        let cache = Self { manager };
        cache.initialize()?;
        Ok(cache)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), CacheError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Path to the database file, `None` when in memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.manager.db_path()
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.get_at(key, now_millis())
    }

    /// Look up an entry as of `now_ms` (epoch milliseconds).
    pub fn get_at(&self, key: &str, now_ms: i64) -> Result<Option<String>, CacheError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 2] = [&key, &now_ms];
        let result = connection.query_row(
            "SELECT data FROM response_cache WHERE key = ? AND expires_at > ?",
            params.as_slice(),
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(data) => Ok(Some(data)),
            Err(::duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Insert or replace an entry that lives for `ttl`.
    ///
    /// A zero TTL stores nothing.
    pub fn set(&self, key: &str, data: &str, ttl: Duration) -> Result<(), CacheError> {
        self.set_at(key, data, ttl, now_millis())
    }

    /// Insert or replace an entry created at `now_ms`.
    pub fn set_at(&self, key: &str, data: &str, ttl: Duration, now_ms: i64) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        if ttl_ms == 0 {
            return Ok(());
        }
        let expires_at = now_ms.saturating_add(ttl_ms);

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), CacheError> {
            // The expiry index rules out INSERT OR REPLACE, so upsert in two steps.
            connection.execute("DELETE FROM response_cache WHERE key = ?", [key])?;

            let params: [&dyn ToSql; 4] = [&key, &data, &now_ms, &expires_at];
            connection.execute(
                "INSERT INTO response_cache (key, data, created_at, expires_at) VALUES (?, ?, ?, ?)",
                params.as_slice(),
            )?;
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Delete expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> Result<usize, CacheError> {
        self.cleanup_expired_at(now_millis())
    }

    pub fn cleanup_expired_at(&self, now_ms: i64) -> Result<usize, CacheError> {
        let connection = self.manager.acquire()?;
        let removed = connection.execute("DELETE FROM response_cache WHERE expires_at <= ?", [now_ms])?;
        Ok(removed)
    }

    /// Count total, expired and active entries.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        self.stats_at(now_millis())
    }

    pub fn stats_at(&self, now_ms: i64) -> Result<CacheStats, CacheError> {
        let connection = self.manager.acquire()?;
        let (total, expired): (i64, i64) = connection.query_row(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE expires_at <= ?) FROM response_cache",
            [now_ms],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let total = u64::try_from(total).unwrap_or_default();
        let expired = u64::try_from(expired).unwrap_or_default();
        Ok(CacheStats {
            total,
            expired,
            active: total.saturating_sub(expired),
        })
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("DELETE FROM response_cache")?;
        Ok(())
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, CacheError>,
) -> Result<T, CacheError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Resolve the thera home directory: `THERA_HOME`, then `$HOME/.thera`.
pub fn resolve_thera_home() -> PathBuf {
    if let Some(path) = env::var_os("THERA_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".thera");
    }

    PathBuf::from(".thera")
}
