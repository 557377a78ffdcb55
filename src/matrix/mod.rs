//! Viewport to tile-index computation.
//!
//! A [`ViewTransform`] describes the current map view (continuous zoom,
//! viewport size and the projection's scale functions). [`TileMatrix`] turns
//! that view into the inclusive rectangle of tile indices that covers it at
//! the nearest integer zoom level.
//!
//! ```text
//! ViewTransform ──(zoom, scale, pixel bounds)──▶ TileMatrix::compute
//!                                                   │
//!                                                   ▼
//!                            { zoom_level, x_min..=x_max, y_min..=y_max }
//! ```

mod tile_matrix;
mod view;

pub use tile_matrix::{TileMatrix, MAX_ZOOM_LEVEL, ZOOM_EPSILON};
pub use view::{
    lat_lon_to_map, MapView, PixelRect, Point, ViewTransform, EARTH_RADIUS, MAP_TOP_LEFT,
    METERS_PER_DEGREE, TILE_SIZE,
};
