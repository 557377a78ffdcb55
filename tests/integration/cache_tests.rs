//! Cache integration tests.
//!
//! Tests verify:
//! - Fetched tiles land in the file cache under namespace/z/x/y.ext
//! - Expiration follows max-age, with the 1 day default and 10 day limit
//! - Fresh entries are served without network access
//! - "No tile" answers are cached and not fetched again
//! - Expired entries are still shown when the network is down
//! - Local file sources bypass the cache

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tile_loader::cache::{FileCache, ImageCache, MemoryCache};
use tile_loader::config::LoaderConfig;
use tile_loader::io::ReqwestFetcher;
use tile_loader::loader::TileImageLoader;
use tile_loader::source::{TileSource, UrlTileSource};
use tile_loader::tile::Tile;

use super::test_utils::{
    create_test_png, MockTileServer, OfflineFetcher, DEFAULT_MAX_AGE, LONG_MAX_AGE_ZOOM,
    NO_MAX_AGE_ZOOM, NO_TILE_ZOOM,
};

fn remaining(expiration: SystemTime) -> Duration {
    expiration
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}

fn assert_close(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_secs(30);
    assert!(
        actual <= expected && actual + tolerance >= expected,
        "expected about {expected:?}, got {actual:?}"
    );
}

/// Loader over real HTTP with a file cache in a fresh directory.
async fn file_cache_loader() -> (TileImageLoader, Arc<FileCache>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCache::open(dir.path()).await.unwrap());
    let fetcher = Arc::new(ReqwestFetcher::new().unwrap());
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher).with_cache(cache.clone());

    (loader, cache, dir)
}

// =============================================================================
// Cache Fill
// =============================================================================

#[tokio::test]
async fn test_tiles_cached_with_max_age() {
    let server = MockTileServer::start().await;
    let (loader, cache, dir) = file_cache_loader().await;
    let source: Arc<dyn TileSource> = Arc::new(UrlTileSource::new(server.template()));

    let tiles = vec![Arc::new(Tile::new(3, 5, 2)), Arc::new(Tile::new(3, -1, 4))];
    let report = loader
        .load_tiles(&tiles, Some(source.clone()), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.downloads, 2);
    assert_eq!(report.loaded, 2);
    assert_eq!(server.request_count(), 2);

    // Wrapped column -1 is stored under its index 7
    assert!(dir.path().join("OSM/3/5/2.png").is_file());
    assert!(dir.path().join("OSM/3/7/4.png").is_file());

    let entry = cache.get("OSM/3/5/2.png").await.unwrap().unwrap();
    assert_eq!(entry.buffer, server.png());
    assert_close(remaining(entry.expiration), DEFAULT_MAX_AGE);

    // Same tiles again: served from the cache
    let again = vec![Arc::new(Tile::new(3, 5, 2)), Arc::new(Tile::new(3, 7, 4))];
    let report = loader
        .load_tiles(&again, Some(source), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.cache_hits, 2);
    assert_eq!(report.downloads, 0);
    assert_eq!(server.request_count(), 2);
    assert!(again.iter().all(|t| t.has_image()));
}

#[tokio::test]
async fn test_expiration_default_and_limit() {
    let server = MockTileServer::start().await;
    let (loader, cache, _dir) = file_cache_loader().await;
    let source: Arc<dyn TileSource> = Arc::new(UrlTileSource::new(server.template()));

    let tiles = vec![
        Arc::new(Tile::new(LONG_MAX_AGE_ZOOM, 1, 1)),
        Arc::new(Tile::new(NO_MAX_AGE_ZOOM, 1, 1)),
    ];
    loader
        .load_tiles(&tiles, Some(source), Some("OSM"))
        .finished()
        .await;

    let key = format!("OSM/{LONG_MAX_AGE_ZOOM}/1/1.png");
    let clamped = cache.get(&key).await.unwrap().unwrap();
    assert_close(
        remaining(clamped.expiration),
        Duration::from_secs(10 * 24 * 3600),
    );

    let key = format!("OSM/{NO_MAX_AGE_ZOOM}/1/1.png");
    let defaulted = cache.get(&key).await.unwrap().unwrap();
    assert_close(remaining(defaulted.expiration), Duration::from_secs(24 * 3600));
}

#[tokio::test]
async fn test_no_tile_cached_and_not_refetched() {
    let server = MockTileServer::start().await;
    let (loader, cache, _dir) = file_cache_loader().await;
    let source: Arc<dyn TileSource> = Arc::new(UrlTileSource::new(server.template()));

    let tiles = vec![Arc::new(Tile::new(NO_TILE_ZOOM, 3, 3))];
    let report = loader
        .load_tiles(&tiles, Some(source.clone()), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.empty, 1);
    assert!(!tiles[0].has_image());

    let entry = cache
        .get(&format!("OSM/{NO_TILE_ZOOM}/3/3.png"))
        .await
        .unwrap()
        .unwrap();
    assert!(entry.buffer.is_empty());

    let tiles = vec![Arc::new(Tile::new(NO_TILE_ZOOM, 3, 3))];
    let report = loader
        .load_tiles(&tiles, Some(source), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.cache_hits, 1);
    assert_eq!(server.request_count(), 1);
}

// =============================================================================
// Expired Entries
// =============================================================================

#[tokio::test]
async fn test_expired_entry_refreshed() {
    let server = MockTileServer::start().await;
    let (loader, cache, _dir) = file_cache_loader().await;
    let source: Arc<dyn TileSource> = Arc::new(UrlTileSource::new(server.template()));

    cache
        .set(
            "OSM/2/1/1.png",
            Bytes::from_static(b"old"),
            SystemTime::now() - Duration::from_secs(1),
        )
        .await
        .unwrap();

    let tiles = vec![Arc::new(Tile::new(2, 1, 1))];
    let report = loader
        .load_tiles(&tiles, Some(source), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.downloads, 1);
    assert_eq!(tiles[0].image().unwrap().data, server.png());

    let entry = cache.get("OSM/2/1/1.png").await.unwrap().unwrap();
    assert_eq!(entry.buffer, server.png());
}

#[tokio::test]
async fn test_stale_entry_shown_when_offline() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCache::open(dir.path()).await.unwrap());
    let png = Bytes::from(create_test_png(4, 4));

    cache
        .set(
            "OSM/4/3/2.png",
            png.clone(),
            SystemTime::now() - Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let fetcher = Arc::new(OfflineFetcher::new());
    let loader =
        TileImageLoader::new(LoaderConfig::default(), fetcher.clone()).with_cache(cache.clone());
    let source: Arc<dyn TileSource> =
        Arc::new(UrlTileSource::new("https://tiles.example/{z}/{x}/{y}.png"));

    let tiles = vec![Arc::new(Tile::new(4, 3, 2)), Arc::new(Tile::new(4, 0, 0))];
    let report = loader
        .load_tiles(&tiles, Some(source), Some("OSM"))
        .finished()
        .await;

    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(tiles[0].image().unwrap().data, png);
    assert!(!tiles[1].has_image());

    // Expired entries stay hidden from plain lookups and go on clean
    assert!(cache.get("OSM/4/3/2.png").await.unwrap().is_none());
    assert_eq!(cache.clean().await.unwrap(), 1);
}

// =============================================================================
// Uncacheable Sources
// =============================================================================

#[tokio::test]
async fn test_file_source_bypasses_cache() {
    let tiles_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tiles_dir.path().join("1/0")).unwrap();
    std::fs::write(tiles_dir.path().join("1/0/1.png"), create_test_png(4, 4)).unwrap();

    let template = format!("{}/{{z}}/{{x}}/{{y}}.png", tiles_dir.path().display());
    let source: Arc<dyn TileSource> = Arc::new(UrlTileSource::new(template));
    assert!(!source.is_cacheable());

    let cache = Arc::new(MemoryCache::new());
    let fetcher = Arc::new(OfflineFetcher::new());
    let loader =
        TileImageLoader::new(LoaderConfig::default(), fetcher.clone()).with_cache(cache.clone());

    let tiles = vec![Arc::new(Tile::new(1, 0, 1)), Arc::new(Tile::new(1, 1, 1))];
    let report = loader
        .load_tiles(&tiles, Some(source), Some("Local"))
        .finished()
        .await;

    assert_eq!(report.loaded, 1);
    assert_eq!(report.empty, 1);
    assert!(tiles[0].has_image());
    assert!(cache.is_empty().await);
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 0);
}
