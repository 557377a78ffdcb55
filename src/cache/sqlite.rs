//! SQLite image cache.
//!
//! All entries live in a single `items` table:
//!
//! ```text
//! items
//! ┌──────────────────┬─────────────────────┬────────────────┐
//! │ key TEXT (PK)    │ expiration INTEGER  │ buffer BLOB    │
//! └──────────────────┴─────────────────────┴────────────────┘
//! ```
//!
//! Expiration is stored in ticks, like the file cache trailer. Expired rows
//! are deleted every time the database is opened.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::error::CacheError;

use super::file::{from_ticks, to_ticks};
use super::{CacheEntry, ImageCache};

/// Database file created when the cache path is a directory
pub const DEFAULT_DATABASE_NAME: &str = "TileCache.sqlite";

const SCHEMA_SQL: &str =
    "CREATE TABLE IF NOT EXISTS items (key TEXT PRIMARY KEY, expiration INTEGER, buffer BLOB)";

/// Image cache backed by a SQLite database.
pub struct SqliteCache {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl SqliteCache {
    /// Open or create the database at `path` and drop expired entries.
    ///
    /// A path without an extension is taken as a directory holding
    /// [`DEFAULT_DATABASE_NAME`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let (cache, _) = Self::open_cleaned(path).await?;
        Ok(cache)
    }

    /// Like [`SqliteCache::open`], also returning how many expired entries
    /// were dropped.
    pub async fn open_cleaned(path: impl AsRef<Path>) -> Result<(Self, usize), CacheError> {
        let path = database_path(path.as_ref());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Workers write concurrently
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        let cache = Self { pool, path };
        debug!(path = %cache.path.display(), "Opened SQLite cache");

        let removed = cache.clean().await?;
        Ok((cache, removed))
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// Close the connection pool, flushing the write-ahead log.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn database_path(path: &Path) -> PathBuf {
    if path.extension().is_none() {
        path.join(DEFAULT_DATABASE_NAME)
    } else {
        path.to_path_buf()
    }
}

fn entry(expiration: i64, buffer: Option<Vec<u8>>) -> CacheEntry {
    CacheEntry::new(
        buffer.map(Bytes::from).unwrap_or_default(),
        from_ticks(expiration),
    )
}

#[async_trait]
impl ImageCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<(i64, Option<Vec<u8>>)> = sqlx::query_as(
            "SELECT expiration, buffer FROM items WHERE key = ? AND expiration >= ?",
        )
        .bind(key)
        .bind(to_ticks(SystemTime::now()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(expiration, buffer)| entry(expiration, buffer)))
    }

    async fn peek(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<(i64, Option<Vec<u8>>)> =
            sqlx::query_as("SELECT expiration, buffer FROM items WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(expiration, buffer)| entry(expiration, buffer)))
    }

    async fn set(
        &self,
        key: &str,
        buffer: Bytes,
        expiration: SystemTime,
    ) -> Result<(), CacheError> {
        sqlx::query("INSERT OR REPLACE INTO items (key, expiration, buffer) VALUES (?, ?, ?)")
            .bind(key)
            .bind(to_ticks(expiration))
            .bind(buffer.as_ref())
            .execute(&self.pool)
            .await?;

        debug!(key, size = buffer.len(), "Stored tile in SQLite cache");
        Ok(())
    }

    async fn clean(&self) -> Result<usize, CacheError> {
        let result = sqlx::query("DELETE FROM items WHERE expiration < ?")
            .bind(to_ticks(SystemTime::now()))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            info!(removed, path = %self.path.display(), "Deleted expired cache entries");
        }

        Ok(removed)
    }
}
