//! SQLite-backed storage integration tests.
//!
//! Tests verify:
//! - Fetched tiles are stored in the SQLite cache and served from it
//! - Cached tiles survive reopening; expired ones are dropped on open
//! - MBTiles files load through the loader without touching the cache

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tile_loader::cache::{ImageCache, MemoryCache, SqliteCache};
use tile_loader::config::{LoaderConfig, TileLayerOptions};
use tile_loader::error::SourceError;
use tile_loader::io::ReqwestFetcher;
use tile_loader::loader::TileImageLoader;
use tile_loader::matrix::{MapView, Point};
use tile_loader::source::{MbTilesSource, TileSource, UrlTileSource};
use tile_loader::tile::{Tile, TileLayer};

use super::test_utils::{
    create_mbtiles, create_test_png, MockTileServer, OfflineFetcher, DEFAULT_MAX_AGE,
};

// =============================================================================
// SQLite Cache
// =============================================================================

#[tokio::test]
async fn test_sqlite_cache_fill_and_hit() {
    let server = MockTileServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SqliteCache::open(dir.path()).await.unwrap());
    let fetcher = Arc::new(ReqwestFetcher::new().unwrap());
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher).with_cache(cache.clone());
    let source: Arc<dyn TileSource> = Arc::new(UrlTileSource::new(server.template()));

    let tiles: Vec<Arc<Tile>> = (0..4).map(|x| Arc::new(Tile::new(2, x, 1))).collect();
    let report = loader
        .load_tiles(&tiles, Some(source.clone()), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.downloads, 4);
    assert_eq!(cache.len().await.unwrap(), 4);

    let entry = cache.get("OSM/2/3/1.png").await.unwrap().unwrap();
    assert_eq!(entry.buffer, server.png());
    let remaining = entry
        .expiration
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    assert!(remaining <= DEFAULT_MAX_AGE && remaining + Duration::from_secs(30) >= DEFAULT_MAX_AGE);

    let again: Vec<Arc<Tile>> = (0..4).map(|x| Arc::new(Tile::new(2, x, 1))).collect();
    let report = loader
        .load_tiles(&again, Some(source), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.cache_hits, 4);
    assert_eq!(server.request_count(), 4);
    assert!(again.iter().all(|t| t.has_image()));
}

#[tokio::test]
async fn test_sqlite_cache_persists_across_open() {
    let dir = tempfile::tempdir().unwrap();
    let png = Bytes::from(create_test_png(4, 4));

    let cache = SqliteCache::open(dir.path()).await.unwrap();
    cache
        .set(
            "OSM/3/1/1.png",
            png.clone(),
            SystemTime::now() + Duration::from_secs(3600),
        )
        .await
        .unwrap();
    cache
        .set(
            "OSM/3/2/2.png",
            png.clone(),
            SystemTime::now() - Duration::from_secs(3600),
        )
        .await
        .unwrap();
    cache.close().await;

    let (cache, removed) = SqliteCache::open_cleaned(dir.path()).await.unwrap();
    assert_eq!(removed, 1);

    // Served from the reopened database without any network
    let fetcher = Arc::new(OfflineFetcher::new());
    let loader =
        TileImageLoader::new(LoaderConfig::default(), fetcher.clone()).with_cache(Arc::new(cache));
    let source: Arc<dyn TileSource> =
        Arc::new(UrlTileSource::new("https://tiles.example/{z}/{x}/{y}.png"));

    let tiles = vec![Arc::new(Tile::new(3, 1, 1))];
    let report = loader
        .load_tiles(&tiles, Some(source), Some("OSM"))
        .finished()
        .await;

    assert_eq!(report.cache_hits, 1);
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(tiles[0].image().unwrap().data, png);
}

// =============================================================================
// MBTiles Source
// =============================================================================

#[tokio::test]
async fn test_mbtiles_loads_without_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.mbtiles");
    let png = create_test_png(8, 8);
    create_mbtiles(&path, "png", &[(1, 0, 0, png.clone()), (1, 1, 1, png.clone())]).await;

    let source: Arc<dyn TileSource> = Arc::new(MbTilesSource::open(&path).await.unwrap());
    let cache = Arc::new(MemoryCache::new());
    let fetcher = Arc::new(OfflineFetcher::new());
    let loader =
        TileImageLoader::new(LoaderConfig::default(), fetcher.clone()).with_cache(cache.clone());

    let tiles = vec![
        Arc::new(Tile::new(1, 0, 0)),
        Arc::new(Tile::new(1, 1, 1)),
        Arc::new(Tile::new(1, 1, 0)),
    ];
    let report = loader
        .load_tiles(&tiles, Some(source), Some("World"))
        .finished()
        .await;

    assert_eq!(report.loaded, 2);
    assert_eq!(report.empty, 1);
    assert_eq!(tiles[0].image().unwrap().data, Bytes::from(png));
    assert!(!tiles[2].has_image());
    assert!(cache.is_empty().await);
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mbtiles_layer_uses_declared_zoom_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.mbtiles");
    create_mbtiles(&path, "jpg", &[]).await;

    let source = MbTilesSource::open(&path).await.unwrap();
    let options = source.layer_options(TileLayerOptions::default());
    assert_eq!((options.min_zoom_level, options.max_zoom_level), (0, 2));

    let fetcher = Arc::new(OfflineFetcher::new());
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher);
    let mut layer = TileLayer::new(options, Arc::new(loader));
    let name = source.name().map(str::to_string);
    layer.set_source(Some(Arc::new(source)), name);

    let view = MapView::new(Point::new(0.0, 0.0), 5.0, 600.0, 400.0);
    layer.update(&view).unwrap().finished().await;

    assert!(!layer.tiles().is_empty());
    assert!(layer.tiles().iter().all(|t| t.zoom_level() <= 2));
}

#[tokio::test]
async fn test_mbtiles_vector_format_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vector.mbtiles");
    create_mbtiles(&path, "pbf", &[]).await;

    let result = MbTilesSource::open(&path).await;
    assert!(matches!(result, Err(SourceError::UnsupportedFormat(f)) if f == "pbf"));
}
