//! Expiring image caches.
//!
//! The loader stores every fetched tile payload under a hierarchical key
//! (`{namespace}/{zoom}/{column}/{row}{ext}`) together with an expiration
//! time derived from the HTTP response. Backends implement [`ImageCache`]:
//!
//! - [`FileCache`]: one file per key below a root directory, expiration kept
//!   in a 16 byte trailer
//! - [`MemoryCache`]: size-bounded LRU, lost on exit
//! - [`SqliteCache`]: one row per key in a SQLite database
//!
//! Backends handle their own concurrency; the loader calls them from several
//! workers at once and treats every error as a miss or a dropped write.

mod file;
mod memory;
mod sqlite;

use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::CacheError;
use crate::tile::TileKey;

pub use file::{from_ticks, to_ticks, FileCache, EXPIRES_TAG, TRAILER_LEN, UNIX_EPOCH_TICKS};
pub use memory::{MemoryCache, DEFAULT_MEMORY_CACHE_CAPACITY};
pub use sqlite::{SqliteCache, DEFAULT_DATABASE_NAME};

/// Extension used when the address has none, and in place of `.jpeg`
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// A cached payload and the time it stops being fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub buffer: Bytes,
    pub expiration: SystemTime,
}

impl CacheEntry {
    pub fn new(buffer: Bytes, expiration: SystemTime) -> Self {
        Self { buffer, expiration }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiration < now
    }
}

/// Key to (bytes, expiration) store shared by loader workers.
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Fresh entry for `key`. Expired entries are never returned.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Entry for `key` whether or not it has expired.
    ///
    /// The loader uses this to keep showing a stale payload when refreshing
    /// it fails.
    async fn peek(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.get(key).await
    }

    /// Store `buffer` under `key`. Empty buffers are valid entries.
    async fn set(&self, key: &str, buffer: Bytes, expiration: SystemTime)
        -> Result<(), CacheError>;

    /// Remove expired entries, returning how many were removed.
    async fn clean(&self) -> Result<usize, CacheError>;
}

/// Cache key of a tile within a namespace.
pub fn cache_key(namespace: &str, tile: &TileKey, extension: &str) -> String {
    format!(
        "{}/{}/{}/{}{}",
        namespace,
        tile.zoom_level,
        tile.x_index(),
        tile.y,
        extension
    )
}

/// File extension of a tile address, including the dot.
///
/// `.jpeg` and addresses without an extension map to `.jpg`.
pub fn tile_extension(uri: &Url) -> String {
    let name = uri
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() => {
            let extension = name[dot..].to_ascii_lowercase();
            if extension == ".jpeg" {
                DEFAULT_EXTENSION.to_string()
            } else {
                extension
            }
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
