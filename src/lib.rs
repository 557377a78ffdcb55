//! # Tile Loader
//!
//! Fetch-and-cache engine for slippy-map tile layers.
//!
//! Given a map view, the crate works out which tiles are visible, loads their
//! images from local files or over HTTP with a bounded pool of workers, keeps
//! them in an expiring cache and hands the encoded images to a display layer.
//!
//! ## Features
//!
//! - **Tile matrices**: visible index ranges with antimeridian wrapping and
//!   coarser background levels under the current zoom level
//! - **Tile sources**: URL templates with subdomains, TMS, WMTS and MBTiles
//! - **Bounded loading**: at most `max_load_tasks` concurrent fetches, newest
//!   batch first, earlier backlog dropped
//! - **Caching**: HTTP `max-age` driven expiration with file, SQLite and
//!   memory backends
//!
//! ## Architecture
//!
//! - [`matrix`] - View transform and tile matrix computation
//! - [`tile`] - Tile model, decoding and layers
//! - [`source`] - Tile addressing strategies
//! - [`loader`] - Concurrent tile image loader
//! - [`cache`] - Image cache contract and backends
//! - [`io`] - HTTP fetching
//! - [`config`] - Loader, layer and CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tile_loader::{
//!     LoaderConfig, MapView, MemoryCache, ReqwestFetcher, TileImageLoader, TileLayer,
//!     TileLayerOptions, UrlTileSource,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let fetcher = Arc::new(ReqwestFetcher::new().unwrap());
//!     let loader = TileImageLoader::new(LoaderConfig::default(), fetcher)
//!         .with_cache(Arc::new(MemoryCache::new()));
//!
//!     let mut layer = TileLayer::new(TileLayerOptions::default(), Arc::new(loader));
//!     layer.set_source(
//!         Some(Arc::new(UrlTileSource::new(
//!             "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
//!         ))),
//!         Some("OpenStreetMap".to_string()),
//!     );
//!
//!     let view = MapView::from_lat_lon(52.52, 13.40, 12.0, 1024.0, 768.0);
//!     if let Some(batch) = layer.update(&view) {
//!         let report = batch.finished().await;
//!         println!("{} tiles loaded", report.loaded);
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod loader;
pub mod matrix;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use cache::{
    cache_key, tile_extension, CacheEntry, FileCache, ImageCache, MemoryCache, SqliteCache,
};
pub use config::{
    CleanConfig, Cli, Command, FetchConfig, LoaderConfig, SourceArgs, TileLayerOptions, UriConfig,
};
pub use error::{CacheError, DecodeError, FetchError, LoaderError, SourceError};
pub use io::{HttpFetcher, HttpResponse, ReqwestFetcher};
pub use loader::{
    ChannelHandoff, DirectHandoff, ImageHandoff, LoadBatch, LoadReport, TileDelivery,
    TileImageLoader,
};
pub use matrix::{MapView, PixelRect, Point, TileMatrix, ViewTransform};
pub use source::{
    MbTilesSource, TileSource, TmsTileSource, UrlTileSource, WmtsTileMatrix, WmtsTileMatrixSet,
    WmtsTileSource,
};
pub use tile::{
    ImageDecoder, Tile, TileDecoder, TileImage, TileKey, TileLayer, TileSet, WmtsTileLayer,
};
