//! In-memory image cache.
//!
//! Entries live in an LRU map bounded both by entry count and by the total
//! size of the cached payloads. Expired entries stay in the map (they can
//! still be peeked as stale data) until [`ImageCache::clean`] runs or LRU
//! eviction drops them.

use std::num::NonZeroUsize;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CacheError;

use super::{CacheEntry, ImageCache};

/// Default cache capacity: 64MB
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Entries are counted at least this size so empty "no tile" entries still
/// weigh on the budget.
const MIN_ENTRY_SIZE: usize = 64;

fn entry_size(key: &str, entry: &CacheEntry) -> usize {
    (key.len() + entry.buffer.len()).max(MIN_ENTRY_SIZE)
}

/// Size-bounded LRU [`ImageCache`].
///
/// # Example
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use bytes::Bytes;
/// use tile_loader::cache::{ImageCache, MemoryCache};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = MemoryCache::with_capacity(1024 * 1024);
///     let expiration = SystemTime::now() + Duration::from_secs(60);
///
///     cache.set("OSM/0/0/0.png", Bytes::from_static(b"png"), expiration).await.unwrap();
///
///     let entry = cache.get("OSM/0/0/0.png").await.unwrap().unwrap();
///     assert_eq!(&entry.buffer[..], b"png");
/// }
/// ```
pub struct MemoryCache {
    /// Entries and the running total of their sizes, updated together
    inner: RwLock<Inner>,

    /// Maximum total size in bytes
    max_size: usize,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    current_size: usize,
}

impl MemoryCache {
    /// Create a cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache bounded by bytes and by entry count.
    ///
    /// A zero entry limit is raised to one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Check if a key is cached, fresh or not, without updating LRU order.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.entries.contains(key)
    }

    /// Remove an entry, returning it if present.
    pub async fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner.entries.pop(key)?;
        inner.current_size = inner.current_size.saturating_sub(entry_size(key, &entry));
        Some(entry)
    }

    /// Clear all entries.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.current_size = 0;
    }

    /// Number of cached entries, including expired ones.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Current accounted size in bytes.
    pub async fn size(&self) -> usize {
        self.inner.read().await.current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .cloned())
    }

    async fn peek(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut inner = self.inner.write().await;
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        buffer: Bytes,
        expiration: SystemTime,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(buffer, expiration);
        let size = entry_size(key, &entry);
        let mut inner = self.inner.write().await;

        // If key exists, subtract old size first
        if let Some(old_size) = inner.entries.peek(key).map(|old| entry_size(key, old)) {
            inner.current_size = inner.current_size.saturating_sub(old_size);
        }

        // Entry count eviction happens inside push
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), entry) {
            if evicted_key != key {
                let evicted_size = entry_size(&evicted_key, &evicted);
                inner.current_size = inner.current_size.saturating_sub(evicted_size);
            }
        }
        inner.current_size += size;

        // Evict entries until we're under capacity
        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    let evicted_size = entry_size(&evicted_key, &evicted);
                    inner.current_size = inner.current_size.saturating_sub(evicted_size);
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn clean(&self) -> Result<usize, CacheError> {
        let now = SystemTime::now();
        let mut inner = self.inner.write().await;

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = inner.entries.pop(key) {
                inner.current_size = inner.current_size.saturating_sub(entry_size(key, &entry));
            }
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Cleaned memory cache");
        }

        Ok(expired.len())
    }
}

// =============================================================================
// Tests
// =============================================================================
