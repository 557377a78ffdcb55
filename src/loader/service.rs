//! Tile image loader.
//!
//! # Pipeline
//!
//! ```text
//! load_tiles(tiles, source, namespace)
//!     │
//!     ├─ clear previous PendingStack (cancels its backlog)
//!     ├─ push pending tiles, first tile on top
//!     └─ spawn min(pending, max_load_tasks) workers
//!                 │
//!                 ▼  per tile
//!     ┌──────────────────────────────────────────────────────┐
//!     │ pop → pending = false                                │
//!     │ cached?  no ─▶ source.load_buffer                    │
//!     │          yes ─▶ cache.peek(key)                      │
//!     │                 fresh ─▶ use cached bytes            │
//!     │                 stale/miss ─▶ fetch, cache.set       │
//!     │                               (fetch failed: stale)  │
//!     │ non-empty ─▶ decode ─▶ handoff.deliver               │
//!     └──────────────────────────────────────────────────────┘
//! ```
//!
//! Every per-tile failure is logged and counted; nothing escapes a worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{cache_key, tile_extension, ImageCache};
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::io::HttpFetcher;
use crate::source::TileSource;
use crate::tile::{ImageDecoder, Tile, TileDecoder};

use super::handoff::{DirectHandoff, ImageHandoff};
use super::pending::PendingStack;

// =============================================================================
// Load Report
// =============================================================================

/// Counters of one `load_tiles` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Pending tiles queued by the batch
    pub requested: usize,

    /// Tiles that received an image
    pub loaded: usize,

    /// Tiles resolved to no payload (missing or "no tile")
    pub empty: usize,

    /// Tiles that failed to fetch or decode
    pub failed: usize,

    /// Tiles served from a fresh cache entry
    pub cache_hits: usize,

    /// Successful network fetches
    pub downloads: usize,
}

impl LoadReport {
    /// Tiles a worker actually picked up.
    pub fn processed(&self) -> usize {
        self.loaded + self.empty + self.failed
    }
}

#[derive(Debug, Default)]
struct BatchStats {
    loaded: AtomicUsize,
    empty: AtomicUsize,
    failed: AtomicUsize,
    cache_hits: AtomicUsize,
    downloads: AtomicUsize,
}

impl BatchStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, requested: usize) -> LoadReport {
        LoadReport {
            requested,
            loaded: self.loaded.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Load Batch
// =============================================================================

/// Completion handle of a `load_tiles` call.
///
/// Dropping the batch does not stop its workers.
#[derive(Debug)]
pub struct LoadBatch {
    requested: usize,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<BatchStats>,
}

impl LoadBatch {
    fn completed() -> Self {
        Self {
            requested: 0,
            workers: Vec::new(),
            stats: Arc::new(BatchStats::default()),
        }
    }

    /// Pending tiles queued by the batch.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Number of workers spawned for the batch.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|worker| worker.is_finished())
    }

    /// Wait for all workers and return the batch counters.
    pub async fn finished(self) -> LoadReport {
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Tile worker terminated abnormally");
            }
        }

        self.stats.report(self.requested)
    }
}

// =============================================================================
// Tile Image Loader
// =============================================================================

/// Dependencies shared by all workers of a loader.
struct Shared {
    config: LoaderConfig,
    cache: Option<Arc<dyn ImageCache>>,
    fetcher: Arc<dyn HttpFetcher>,
    decoder: Arc<dyn TileDecoder>,
    handoff: Arc<dyn ImageHandoff>,
}

/// Loads tile images through a bounded pool of workers.
///
/// Each call to [`load_tiles`](Self::load_tiles) supersedes the previous one:
/// tiles still queued from the earlier batch are dropped, tiles already being
/// loaded finish normally.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use tile_loader::{
///     LoaderConfig, ReqwestFetcher, Tile, TileImageLoader, TileSource, UrlTileSource,
/// };
///
/// #[tokio::main]
/// async fn main() {
///     let fetcher = Arc::new(ReqwestFetcher::new().unwrap());
///     let loader = TileImageLoader::new(LoaderConfig::default(), fetcher);
///
///     let source: Arc<dyn TileSource> =
///         Arc::new(UrlTileSource::new("https://tile.example/{z}/{x}/{y}.png"));
///     let tiles = vec![Arc::new(Tile::new(1, 0, 0)), Arc::new(Tile::new(1, 1, 0))];
///
///     let report = loader.load_tiles(&tiles, Some(source), None).finished().await;
///     println!("{} tiles loaded", report.loaded);
/// }
/// ```
pub struct TileImageLoader {
    shared: Arc<Shared>,

    /// Stack of the latest batch
    current: Mutex<Arc<PendingStack>>,
}

impl TileImageLoader {
    /// Create a loader without a cache, decoding with [`ImageDecoder`] and
    /// setting images directly on tiles.
    pub fn new(config: LoaderConfig, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                cache: None,
                fetcher,
                decoder: Arc::new(ImageDecoder::new()),
                handoff: Arc::new(DirectHandoff),
            }),
            current: Mutex::new(Arc::new(PendingStack::default())),
        }
    }

    pub fn with_cache(self, cache: Arc<dyn ImageCache>) -> Self {
        self.map_shared(|shared| shared.cache = Some(cache))
    }

    pub fn with_decoder(self, decoder: Arc<dyn TileDecoder>) -> Self {
        self.map_shared(|shared| shared.decoder = decoder)
    }

    pub fn with_handoff(self, handoff: Arc<dyn ImageHandoff>) -> Self {
        self.map_shared(|shared| shared.handoff = handoff)
    }

    fn map_shared(self, update: impl FnOnce(&mut Shared)) -> Self {
        let Self { shared, current } = self;

        // Builders run before any batch, so the Arc is not shared yet
        let mut shared = match Arc::try_unwrap(shared) {
            Ok(shared) => shared,
            Err(shared) => Shared {
                config: shared.config.clone(),
                cache: shared.cache.clone(),
                fetcher: shared.fetcher.clone(),
                decoder: shared.decoder.clone(),
                handoff: shared.handoff.clone(),
            },
        };
        update(&mut shared);

        Self {
            shared: Arc::new(shared),
            current,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    pub fn cache(&self) -> Option<&Arc<dyn ImageCache>> {
        self.shared.cache.as_ref()
    }

    /// Start loading the pending tiles of `tiles`.
    ///
    /// Tiles are served in list order. Results are cached under
    /// `cache_namespace` when a cache is configured and the source is
    /// cacheable. Without a source the call only cancels the previous batch.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load_tiles(
        &self,
        tiles: &[Arc<Tile>],
        source: Option<Arc<dyn TileSource>>,
        cache_namespace: Option<&str>,
    ) -> LoadBatch {
        let stack = match source {
            Some(_) => Arc::new(PendingStack::from_pending(tiles)),
            None => Arc::new(PendingStack::default()),
        };

        let cancelled = self.replace_stack(stack.clone());
        if cancelled > 0 {
            debug!(cancelled, "Dropped queued tiles of previous batch");
        }

        let Some(source) = source else {
            return LoadBatch::completed();
        };

        let requested = stack.len();
        if requested == 0 {
            return LoadBatch::completed();
        }

        let namespace = cache_namespace
            .filter(|ns| !ns.is_empty())
            .filter(|_| self.shared.cache.is_some() && source.is_cacheable())
            .map(str::to_string);

        let stats = Arc::new(BatchStats::default());
        let worker_count = requested.min(self.shared.config.max_load_tasks.max(1));

        debug!(
            requested,
            workers = worker_count,
            namespace = namespace.as_deref().unwrap_or("-"),
            "Loading tiles"
        );

        let workers = (0..worker_count)
            .map(|_| {
                tokio::spawn(run_worker(
                    self.shared.clone(),
                    stack.clone(),
                    source.clone(),
                    namespace.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        LoadBatch {
            requested,
            workers,
            stats,
        }
    }

    /// Drop the queued tiles of the current batch.
    pub fn cancel(&self) -> usize {
        self.replace_stack(Arc::new(PendingStack::default()))
    }

    /// Install a new stack, clearing the old one. Returns the number of
    /// tiles dropped from the old stack.
    fn replace_stack(&self, stack: Arc<PendingStack>) -> usize {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::mem::replace(&mut *current, stack);
        previous.clear()
    }
}

// =============================================================================
// Workers
// =============================================================================

async fn run_worker(
    shared: Arc<Shared>,
    stack: Arc<PendingStack>,
    source: Arc<dyn TileSource>,
    namespace: Option<String>,
    stats: Arc<BatchStats>,
) {
    while let Some(tile) = stack.pop() {
        tile.set_pending(false);

        match shared
            .load_tile(&tile, source.as_ref(), namespace.as_deref(), &stats)
            .await
        {
            Ok(true) => BatchStats::bump(&stats.loaded),
            Ok(false) => BatchStats::bump(&stats.empty),
            Err(e) => {
                warn!(tile = %tile.key(), error = %e, "Failed to load tile");
                BatchStats::bump(&stats.failed);
            }
        }
    }
}

impl Shared {
    /// Resolve one tile. Returns whether an image was delivered.
    async fn load_tile(
        &self,
        tile: &Arc<Tile>,
        source: &dyn TileSource,
        namespace: Option<&str>,
        stats: &BatchStats,
    ) -> Result<bool, LoaderError> {
        let buffer = match (namespace, self.cache.as_deref()) {
            (Some(namespace), Some(cache)) => {
                self.load_cached(tile, source, namespace, cache, stats)
                    .await?
            }
            _ => {
                source
                    .load_buffer(
                        tile.x_index(),
                        tile.y(),
                        tile.zoom_level(),
                        self.fetcher.as_ref(),
                    )
                    .await?
            }
        };

        if buffer.is_empty() {
            debug!(tile = %tile.key(), "No tile image");
            return Ok(false);
        }

        let image = self.decoder.decode(buffer)?;

        if !self.handoff.deliver(tile.clone(), image) {
            debug!(tile = %tile.key(), "Display gone, tile left pending");
            tile.set_pending(true);
            return Ok(false);
        }

        Ok(true)
    }

    async fn load_cached(
        &self,
        tile: &Tile,
        source: &dyn TileSource,
        namespace: &str,
        cache: &dyn ImageCache,
        stats: &BatchStats,
    ) -> Result<Bytes, LoaderError> {
        let Some(uri) = source.uri(tile.x_index(), tile.y(), tile.zoom_level()) else {
            return Ok(Bytes::new());
        };

        let key = cache_key(namespace, &tile.key(), &tile_extension(&uri));

        let cached = match cache.peek(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                None
            }
        };

        if let Some(entry) = cached.as_ref().filter(|entry| !entry.is_expired()) {
            BatchStats::bump(&stats.cache_hits);
            return Ok(entry.buffer.clone());
        }

        match self.fetcher.get(&uri).await {
            Ok(response) => {
                BatchStats::bump(&stats.downloads);

                let expiration = SystemTime::now() + self.config.expiration_for(response.max_age);
                if let Err(e) = cache.set(&key, response.buffer.clone(), expiration).await {
                    warn!(key = %key, error = %e, "Cache write failed");
                }

                Ok(response.buffer)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(uri = %uri, error = %e, "Fetch failed, using expired cache entry");
                    Ok(stale.buffer)
                }
                None => Err(e.into()),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
