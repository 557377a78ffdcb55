//! File system image cache.
//!
//! Each key maps to one file below the cache root. The key is split on `/`,
//! `:`, `;` and `,` into directory components, so `OSM/8/3/5.png` is stored
//! at `{root}/OSM/8/3/5.png`.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────┬──────────────┬──────────────────────┐
//! │ payload (0..n bytes)       │ "EXPIRES:"   │ expiration ticks     │
//! │                            │ 8 bytes      │ i64, little endian   │
//! └────────────────────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! Ticks count 100 ns intervals since 0001-01-01T00:00:00 UTC. Files without
//! a valid trailer are returned whole and treated as already expired.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::error::CacheError;

use super::{CacheEntry, ImageCache};

/// Marker preceding the expiration ticks
pub const EXPIRES_TAG: &[u8; 8] = b"EXPIRES:";

/// Length of the expiration trailer
pub const TRAILER_LEN: usize = 16;

/// Ticks at 1970-01-01T00:00:00 UTC
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

const NANOS_PER_TICK: u128 = 100;

/// Suffix of in-progress writes, skipped by [`FileCache::clean`]
const TEMP_SUFFIX: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Tick Conversion
// =============================================================================

/// Convert a time to ticks, saturating at the `i64` range.
pub fn to_ticks(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            let ticks = (after.as_nanos() / NANOS_PER_TICK).min(i64::MAX as u128) as i64;
            UNIX_EPOCH_TICKS.saturating_add(ticks)
        }
        Err(before) => {
            let ticks = (before.duration().as_nanos() / NANOS_PER_TICK).min(i64::MAX as u128) as i64;
            UNIX_EPOCH_TICKS.saturating_sub(ticks)
        }
    }
}

/// Convert ticks to a time. Values the platform cannot represent map to the
/// Unix epoch, which reads as expired.
pub fn from_ticks(ticks: i64) -> SystemTime {
    let delta = ticks as i128 - UNIX_EPOCH_TICKS as i128;
    let nanos = delta.unsigned_abs().saturating_mul(NANOS_PER_TICK);
    let offset = Duration::new(
        (nanos / 1_000_000_000).min(u64::MAX as u128) as u64,
        (nanos % 1_000_000_000) as u32,
    );

    let time = if delta >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };

    time.unwrap_or(UNIX_EPOCH)
}

/// Split a stored file into payload and expiration.
fn decode_entry(mut data: Vec<u8>) -> CacheEntry {
    match read_trailer(&data) {
        Some(expiration) => {
            data.truncate(data.len() - TRAILER_LEN);
            CacheEntry::new(Bytes::from(data), expiration)
        }
        None => CacheEntry::new(Bytes::from(data), UNIX_EPOCH),
    }
}

fn read_trailer(data: &[u8]) -> Option<SystemTime> {
    if data.len() < TRAILER_LEN {
        return None;
    }

    let trailer = &data[data.len() - TRAILER_LEN..];
    if &trailer[..8] != EXPIRES_TAG {
        return None;
    }

    let mut ticks = [0u8; 8];
    ticks.copy_from_slice(&trailer[8..]);
    Some(from_ticks(i64::from_le_bytes(ticks)))
}

fn encode_entry(buffer: &[u8], expiration: SystemTime) -> Bytes {
    let mut data = BytesMut::with_capacity(buffer.len() + TRAILER_LEN);
    data.put_slice(buffer);
    data.put_slice(EXPIRES_TAG);
    data.put_i64_le(to_ticks(expiration));
    data.freeze()
}

// =============================================================================
// File Cache
// =============================================================================

/// [`ImageCache`] storing one file per key below a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so
/// concurrent readers never see a partially written file.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Use `root` as the cache directory without touching the file system.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a cache, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache = Self::new(root);
        tokio::fs::create_dir_all(&cache.root).await?;
        debug!(root = %cache.root.display(), "Opened file cache");
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let mut path = self.root.clone();
        let mut components = 0;

        for part in key.split(['/', ':', ';', ',']) {
            let valid = !part.is_empty()
                && !part.contains('\\')
                && matches!(Path::new(part).components().next(), Some(Component::Normal(_)))
                && Path::new(part).components().count() == 1;

            if !valid {
                return Err(CacheError::InvalidKey(key.to_string()));
            }

            path.push(part);
            components += 1;
        }

        if components == 0 {
            return Err(CacheError::InvalidKey(key.to_string()));
        }

        Ok(path)
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(decode_entry(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Io(format!("{}: {e}", path.display()))),
        }
    }
}

#[async_trait]
impl ImageCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.read(key).await?.filter(|entry| !entry.is_expired()))
    }

    async fn peek(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.read(key).await
    }

    async fn set(
        &self,
        key: &str,
        buffer: Bytes,
        expiration: SystemTime,
    ) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(CacheError::InvalidKey(key.to_string()));
        };

        tokio::fs::create_dir_all(dir).await?;

        let temp = dir.join(format!(
            ".{}.{}.{}{}",
            name.to_string_lossy(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_SUFFIX
        ));

        let data = encode_entry(&buffer, expiration);
        if let Err(e) = tokio::fs::write(&temp, &data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheError::Io(format!("{}: {e}", temp.display())));
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheError::Io(format!("{}: {e}", path.display())));
        }

        Ok(())
    }

    async fn clean(&self) -> Result<usize, CacheError> {
        let root = self.root.clone();
        let now = SystemTime::now();

        let removed = tokio::task::spawn_blocking(move || clean_directory(&root, now, true))
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;

        if removed > 0 {
            info!(root = %self.root.display(), removed, "Cleaned file cache");
        }

        Ok(removed)
    }
}

// =============================================================================
// Cleaning
// =============================================================================

/// Delete expired files below `dir` and remove directories left empty.
///
/// Errors on individual entries are logged and skipped.
fn clean_directory(dir: &Path, now: SystemTime, is_root: bool) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if !(is_root && e.kind() == std::io::ErrorKind::NotFound) {
                warn!(dir = %dir.display(), error = %e, "Failed to read cache directory");
            }
            return 0;
        }
    };

    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            removed += clean_directory(&path, now, false);
        } else if file_type.is_file() && !is_temp_file(&path) {
            match file_expiration(&path) {
                Ok(expiration) if expiration >= now => {}
                Ok(_) => match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache file"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read cache file"),
            }
        }
    }

    if !is_root {
        // Fails harmlessly when the directory is not empty
        if std::fs::remove_dir(dir).is_ok() {
            debug!(dir = %dir.display(), "Removed empty cache directory");
        }
    }

    removed
}

/// Expiration stored in a file's trailer, reading only the last 16 bytes.
fn file_expiration(path: &Path) -> std::io::Result<SystemTime> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();

    if len < TRAILER_LEN as u64 {
        return Ok(UNIX_EPOCH);
    }

    let mut trailer = [0u8; TRAILER_LEN];
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
    file.read_exact(&mut trailer)?;

    Ok(read_trailer(&trailer).unwrap_or(UNIX_EPOCH))
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
        })
        .unwrap_or(false)
}

// =============================================================================
// Tests
// =============================================================================
