//! Tiles and tile layers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          TileLayer / WmtsTileLayer      │
//! │   view ─▶ TileMatrix ─▶ TileSet         │
//! └────────────────────┬────────────────────┘
//!                      │ Arc<Tile> (pending)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            TileImageLoader              │
//! │   bytes ─▶ TileDecoder ─▶ TileImage     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Tile`]: shared load state of one tile (pending flag and image)
//! - [`TileKey`]: zoom level, signed column and row identifying a tile
//! - [`TileImage`]: encoded payload with its sniffed format and pixel size
//! - [`TileDecoder`]: turns fetched bytes into a [`TileImage`]
//! - [`TileSet`]: tiles a layer tracks, rebuilt on every matrix change
//! - [`TileLayer`]: keeps a [`TileSet`] in sync with a view and starts loads

mod decoder;
mod layer;
mod model;

pub use decoder::{ImageDecoder, TileDecoder};
pub use layer::{TileLayer, TileSet, WmtsTileLayer};
pub use model::{Tile, TileImage, TileKey};
