//! Loader integration tests.
//!
//! Tests verify:
//! - Concurrency never exceeds max_load_tasks
//! - A new batch drops the queued backlog of the previous one
//! - Tiles are served in list order
//! - Handoff refusal leaves tiles pending

use std::sync::Arc;
use std::time::Duration;

use tile_loader::config::LoaderConfig;
use tile_loader::loader::{ChannelHandoff, ImageHandoff, TileImageLoader};
use tile_loader::source::{TileSource, UrlTileSource};
use tile_loader::tile::{Tile, TileImage};

use super::test_utils::{GatedFetcher, TrackingFetcher};

fn source() -> Option<Arc<dyn TileSource>> {
    Some(Arc::new(UrlTileSource::new(
        "https://tiles.example/{z}/{x}/{y}.png",
    )))
}

fn row_of_tiles(zoom_level: u32, count: i32) -> Vec<Arc<Tile>> {
    (0..count)
        .map(|i| Arc::new(Tile::new(zoom_level, i % 32, i / 32)))
        .collect()
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bounded_by_max_load_tasks() {
    let fetcher = Arc::new(TrackingFetcher::new().with_delay(Duration::from_millis(20)));
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher.clone());

    let tiles = row_of_tiles(5, 20);
    let batch = loader.load_tiles(&tiles, source(), None);
    assert_eq!(batch.worker_count(), 4);

    let report = batch.finished().await;

    assert_eq!(report.requested, 20);
    assert_eq!(report.loaded, 20);
    assert_eq!(fetcher.request_count(), 20);
    assert!(fetcher.max_in_flight() <= 4);
    assert!(fetcher.max_in_flight() >= 2);
    assert!(tiles.iter().all(|t| t.has_image() && !t.is_pending()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_task_loads_in_list_order() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let config = LoaderConfig {
        max_load_tasks: 1,
        ..LoaderConfig::default()
    };
    let loader = TileImageLoader::new(config, fetcher.clone());

    let tiles = vec![
        Arc::new(Tile::new(3, 2, 1)),
        Arc::new(Tile::new(3, 0, 0)),
        Arc::new(Tile::new(3, 7, 7)),
    ];
    loader.load_tiles(&tiles, source(), None).finished().await;

    assert_eq!(
        fetcher.requests(),
        vec![
            "https://tiles.example/3/2/1.png",
            "https://tiles.example/3/0/0.png",
            "https://tiles.example/3/7/7.png",
        ]
    );
}

// =============================================================================
// Batch Supersession
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_new_batch_drops_previous_backlog() {
    let fetcher = Arc::new(GatedFetcher::new());
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher.clone());

    let first = row_of_tiles(5, 20);
    let first_batch = loader.load_tiles(&first, source(), None);

    // All four workers are stuck in their first fetch
    fetcher.wait_for_requests(4).await;

    let second = row_of_tiles(6, 3);
    let second_batch = loader.load_tiles(&second, source(), None);

    fetcher.open();
    let first_report = first_batch.finished().await;
    let second_report = second_batch.finished().await;

    let first_fetches = fetcher
        .requests()
        .iter()
        .filter(|url| url.contains("/5/"))
        .count();
    assert_eq!(first_fetches, 4);
    assert_eq!(first_report.loaded, 4);
    assert_eq!(second_report.loaded, 3);

    // Tiles never popped keep waiting for a later batch
    let untouched = first.iter().filter(|t| t.is_pending()).count();
    assert_eq!(untouched, 16);
    assert!(second.iter().all(|t| t.has_image()));
}

#[tokio::test]
async fn test_tiles_already_loading_are_not_requeued() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher.clone());

    let tiles = row_of_tiles(4, 6);
    tiles[0].set_pending(false);
    tiles[3].set_pending(false);

    let report = loader.load_tiles(&tiles, source(), None).finished().await;

    assert_eq!(report.requested, 4);
    assert_eq!(fetcher.request_count(), 4);
    assert!(!tiles[0].has_image());
}

// =============================================================================
// Image Handoff
// =============================================================================

struct ClosedDisplay;

impl ImageHandoff for ClosedDisplay {
    fn deliver(&self, _tile: Arc<Tile>, _image: TileImage) -> bool {
        false
    }
}

#[tokio::test]
async fn test_refused_delivery_leaves_tile_pending() {
    let loader = TileImageLoader::new(LoaderConfig::default(), Arc::new(TrackingFetcher::new()))
        .with_handoff(Arc::new(ClosedDisplay));

    let tiles = row_of_tiles(2, 2);
    let report = loader.load_tiles(&tiles, source(), None).finished().await;

    assert_eq!(report.loaded, 0);
    assert!(tiles.iter().all(|t| t.is_pending() && !t.has_image()));
}

#[tokio::test]
async fn test_channel_handoff_applies_on_receiver() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let (handoff, mut receiver) = ChannelHandoff::new();
    let loader = TileImageLoader::new(LoaderConfig::default(), fetcher.clone())
        .with_handoff(Arc::new(handoff));

    let tiles = row_of_tiles(2, 3);
    let report = loader.load_tiles(&tiles, source(), None).finished().await;
    assert_eq!(report.loaded, 3);

    // Nothing is applied until the display context drains the channel
    assert!(tiles.iter().all(|t| !t.has_image() && !t.is_pending()));

    for _ in 0..3 {
        let delivery = receiver.recv().await.unwrap();
        assert_eq!(delivery.image.data, fetcher.png());
        delivery.apply();
    }
    assert!(tiles.iter().all(|t| t.has_image()));
}
