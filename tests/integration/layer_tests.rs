//! Layer integration tests.
//!
//! Tests verify:
//! - Unchanged tile matrices trigger no reload
//! - Zooming reuses loaded tiles and only requests new ones
//! - Base layers fill background levels, overlays do not
//! - WMTS layers cache under a matrix-set scoped namespace

use std::collections::HashSet;
use std::sync::Arc;

use tile_loader::cache::MemoryCache;
use tile_loader::config::{LoaderConfig, TileLayerOptions};
use tile_loader::loader::TileImageLoader;
use tile_loader::matrix::{MapView, Point, METERS_PER_DEGREE};
use tile_loader::source::{UrlTileSource, WmtsTileMatrixSet, WmtsTileSource};
use tile_loader::tile::{TileKey, TileLayer, WmtsTileLayer};

use super::test_utils::TrackingFetcher;

const TEMPLATE: &str = "https://tiles.example/{z}/{x}/{y}.png";

fn layer(options: TileLayerOptions, fetcher: Arc<TrackingFetcher>) -> TileLayer {
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher);
    let mut layer = TileLayer::new(options, Arc::new(loader));
    layer.set_source(
        Some(Arc::new(UrlTileSource::new(TEMPLATE))),
        Some("OSM".to_string()),
    );
    layer
}

fn view(x: f64, y: f64, zoom: f64) -> MapView {
    MapView::new(Point::new(x, y), zoom, 600.0, 400.0)
}

fn zoom_levels(layer: &TileLayer) -> Vec<u32> {
    let mut levels: Vec<u32> = layer
        .tiles()
        .iter()
        .map(|t| t.zoom_level())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    levels.sort_unstable();
    levels
}

#[tokio::test]
async fn test_unchanged_matrix_does_not_reload() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let mut layer = layer(TileLayerOptions::default(), fetcher.clone());

    let report = layer.update(&view(1000.0, 1000.0, 4.3)).unwrap().finished().await;
    assert_eq!(report.requested, layer.tiles().len());
    assert_eq!(report.loaded, report.requested);
    assert!(layer.tiles().iter().all(|t| t.has_image()));

    let requests = fetcher.request_count();

    // Same view, a sub-tile pan and a fractional zoom change
    assert!(layer.update(&view(1000.0, 1000.0, 4.3)).is_none());
    assert!(layer.update(&view(1010.0, 990.0, 4.3)).is_none());
    assert!(layer.update(&view(1000.0, 1000.0, 4.31)).is_none());
    assert_eq!(fetcher.request_count(), requests);
}

#[tokio::test]
async fn test_zoom_in_reuses_loaded_tiles() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let mut layer = layer(TileLayerOptions::default(), fetcher.clone());

    layer.update(&view(0.0, 0.0, 3.0)).unwrap().finished().await;
    let before: HashSet<TileKey> = layer.tiles().iter().map(|t| t.key()).collect();
    let first = layer.tiles().tiles()[0].clone();

    let report = layer.update(&view(0.0, 0.0, 4.0)).unwrap().finished().await;

    let new_tiles = layer
        .tiles()
        .iter()
        .filter(|t| !before.contains(&t.key()))
        .count();
    assert!(new_tiles > 0);
    assert_eq!(report.requested, new_tiles);

    // Coarse background tiles carried over with their images
    let kept = layer.tiles().get(&first.key()).unwrap();
    assert!(Arc::ptr_eq(kept, &first));
    assert!(kept.has_image());
}

#[tokio::test]
async fn test_base_layer_background_levels() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let options = TileLayerOptions {
        min_zoom_level: 2,
        max_background_levels: 3,
        ..TileLayerOptions::default()
    };
    let mut layer = layer(options, fetcher);

    layer.update(&view(0.0, 0.0, 7.5)).unwrap().finished().await;

    assert_eq!(layer.matrix().unwrap().zoom_level, 7);
    assert_eq!(zoom_levels(&layer), vec![4, 5, 6, 7]);
}

#[tokio::test]
async fn test_overlay_only_current_level() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let mut layer = layer(TileLayerOptions::overlay(), fetcher);

    layer.update(&view(0.0, 0.0, 7.5)).unwrap().finished().await;

    assert_eq!(zoom_levels(&layer), vec![7]);
}

#[tokio::test]
async fn test_max_zoom_caps_levels() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let options = TileLayerOptions {
        max_zoom_level: 5,
        max_background_levels: 4,
        ..TileLayerOptions::default()
    };
    let mut layer = layer(options, fetcher.clone());

    layer.update(&view(0.0, 0.0, 8.0)).unwrap().finished().await;

    // Reference level 8 is capped to 5; background still counts from 8
    assert_eq!(zoom_levels(&layer), vec![4, 5]);
    assert!(fetcher
        .requests()
        .iter()
        .all(|url| url.contains("/4/") || url.contains("/5/")));
}

#[tokio::test]
async fn test_antimeridian_tiles_fetch_wrapped_columns() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let mut layer = layer(TileLayerOptions::overlay(), fetcher.clone());

    // Centered on the antimeridian at zoom 2
    let antimeridian = 180.0 * METERS_PER_DEGREE;
    layer
        .update(&view(antimeridian, 0.0, 2.0))
        .unwrap()
        .finished()
        .await;

    let matrix = *layer.matrix().unwrap();
    assert!(matrix.x_max >= 4);

    for url in fetcher.requests() {
        let column: i32 = url.split('/').nth(4).unwrap().parse().unwrap();
        assert!((0..4).contains(&column), "unwrapped column in {url}");
    }
}

#[tokio::test]
async fn test_empty_view_clears_tiles() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let mut layer = layer(TileLayerOptions::default(), fetcher);

    layer.update(&view(0.0, 0.0, 3.0)).unwrap().finished().await;
    assert!(!layer.tiles().is_empty());

    let empty = MapView::new(Point::new(0.0, 0.0), 3.0, 0.0, 0.0);
    let report = layer.update(&empty).unwrap().finished().await;
    assert_eq!(report.requested, 0);
    assert!(layer.tiles().is_empty());
    assert!(layer.matrix().is_none());

    assert!(layer.update(&empty).is_none());
}

#[tokio::test]
async fn test_set_source_forces_reload() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let mut layer = layer(TileLayerOptions::default(), fetcher.clone());

    layer.update(&view(0.0, 0.0, 3.0)).unwrap().finished().await;
    let first = fetcher.request_count();

    layer.set_source(
        Some(Arc::new(UrlTileSource::new(
            "https://other.example/{z}/{x}/{y}.png",
        ))),
        Some("Other".to_string()),
    );
    let report = layer.update(&view(0.0, 0.0, 3.0)).unwrap().finished().await;

    assert_eq!(report.requested, first);
    assert!(fetcher.requests()[first..]
        .iter()
        .all(|url| url.starts_with("https://other.example/")));
}

#[tokio::test]
async fn test_wmts_layer_cache_namespace() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let cache = Arc::new(MemoryCache::new());
    let loader =
        TileImageLoader::new(LoaderConfig::default(), fetcher.clone()).with_cache(cache.clone());

    let source = WmtsTileSource::new(
        "https://wmts.example/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}.png",
        WmtsTileMatrixSet::web_mercator_quad("EPSG:3857", 18),
    );

    let mut layer = WmtsTileLayer::new(TileLayerOptions::default(), Arc::new(loader));
    layer.set_source(Some(Arc::new(source)), Some("OSM".to_string()));
    assert_eq!(layer.cache_namespace().as_deref(), Some("OSM/EPSG_3857"));

    let view = view(0.0, 0.0, 3.0);
    let report = layer.update(&view).unwrap().finished().await;

    assert_eq!(layer.matrices().len(), 4);
    assert_eq!(report.downloads, layer.tiles().len());
    assert!(fetcher
        .requests()
        .iter()
        .all(|url| url.starts_with("https://wmts.example/EPSG:3857/")));

    let tile = &layer.tiles().tiles()[0];
    let key = format!(
        "OSM/EPSG_3857/{}/{}/{}.png",
        tile.zoom_level(),
        tile.x_index(),
        tile.y()
    );
    assert!(cache.contains(&key).await);

    assert!(layer.update(&view).is_none());
}

#[tokio::test]
async fn test_layer_without_source_has_no_tiles() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher.clone());
    let mut layer = TileLayer::new(TileLayerOptions::default(), Arc::new(loader));

    let report = layer.update(&view(0.0, 0.0, 3.0)).unwrap().finished().await;

    assert_eq!(report.requested, 0);
    assert!(layer.tiles().is_empty());
    assert_eq!(layer.matrix().unwrap().zoom_level, 3);
    assert_eq!(fetcher.request_count(), 0);

    layer.set_source(
        Some(Arc::new(UrlTileSource::new(TEMPLATE))),
        Some("OSM".to_string()),
    );
    let report = layer.update(&view(0.0, 0.0, 3.0)).unwrap().finished().await;

    assert!(report.requested > 0);
    assert_eq!(report.loaded, layer.tiles().len());
}
