//! SQLite-backed response cache shared by all tool handlers.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

/// Keyed store of serialized tool responses with per-entry expiry.
pub trait ResponseCache: Send + Sync {
    /// Returns the live value for `key`, if any.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` for `ttl`. A live entry under the same key is kept as is.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Drops the entry for `key` regardless of its expiry.
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Cache storage backed by a local SQLite database.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens the default on-disk cache database and initializes schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created, the database cannot
    /// be opened, or schema initialization fails.
    pub fn new() -> anyhow::Result<Self> {
        let db_path = cache_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open sqlite cache at {}", db_path.display()))?;
        tracing::debug!(path = %db_path.display(), "opened response cache");
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite cache")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS cache_entries (
  cache_key TEXT PRIMARY KEY,
  cache_value TEXT NOT NULL,
  expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries (expires_at);
"#,
        )
        .context("failed to initialize sqlite cache schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ResponseCache for SqliteCache {
    /// Expired entries are deleted on read and treated as cache misses.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = unix_now()?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("sqlite cache mutex poisoned"))?;

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT cache_value, expires_at FROM cache_entries WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to query sqlite cache entry")?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at <= now {
            conn.execute(
                "DELETE FROM cache_entries WHERE cache_key = ?1",
                params![key],
            )
            .context("failed to delete expired sqlite cache entry")?;
            return Ok(None);
        }

        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let now = unix_now()?;
        let ttl_seconds =
            i64::try_from(ttl.as_secs()).context("cache ttl seconds exceeds i64 range")?;
        let expires_at = now
            .checked_add(ttl_seconds)
            .ok_or_else(|| anyhow!("cache expiry timestamp overflow"))?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("sqlite cache mutex poisoned"))?;

        conn.execute(
            r#"
INSERT INTO cache_entries (cache_key, cache_value, expires_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(cache_key) DO UPDATE SET
  cache_value = excluded.cache_value,
  expires_at = excluded.expires_at
WHERE cache_entries.expires_at <= ?4
"#,
            params![key, value, expires_at, now],
        )
        .context("failed to write sqlite cache entry")?;

        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("sqlite cache mutex poisoned"))?;
        conn.execute(
            "DELETE FROM cache_entries WHERE cache_key = ?1",
            params![key],
        )
        .context("failed to delete sqlite cache entry")?;
        Ok(())
    }
}

fn cache_db_path() -> PathBuf {
    if let Some(explicit) = env::var_os("PACKAGE_PULSE_CACHE_DB_PATH") {
        return PathBuf::from(explicit);
    }

    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    home.join(".cache").join("package-pulse").join("cache.db")
}

fn unix_now() -> anyhow::Result<i64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before unix epoch")?;
    i64::try_from(since_epoch.as_secs()).context("unix timestamp exceeds i64 range")
}
