//! Map view collaborator.
//!
//! The tile engine does not own projection math. It only needs the current
//! continuous zoom level, the viewport size, the zoom/scale conversion and the
//! pixel bounds of the viewport inside a tile matrix. [`MapView`] is a plain
//! web mercator view used by the CLI and tests; applications with their own
//! projection implement [`ViewTransform`] directly.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// WGS84 equatorial radius in meters
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Length of one degree of longitude at the equator, in meters
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS * PI / 180.0;

/// Tile edge length used by the standard web mercator tile pyramid
pub const TILE_SIZE: u32 = 256;

/// Top left corner of the web mercator tile pyramid, in projected meters
pub const MAP_TOP_LEFT: Point = Point {
    x: -180.0 * METERS_PER_DEGREE,
    y: 180.0 * METERS_PER_DEGREE,
};

/// A point in projected map coordinates or pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in tile matrix pixel space.
///
/// `y` grows downwards, as in the tile matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// Read-only view of the map consumed by tile matrix computation.
pub trait ViewTransform {
    /// Continuous zoom level of the view
    fn zoom_level(&self) -> f64;

    /// Viewport size in device pixels as `(width, height)`
    fn view_size(&self) -> (f64, f64);

    /// Pixels per projected meter at a zoom level
    fn zoom_level_to_scale(&self, zoom_level: f64) -> f64;

    /// Inverse of [`zoom_level_to_scale`](Self::zoom_level_to_scale)
    fn scale_to_zoom_level(&self, scale: f64) -> f64;

    /// Bounds of the viewport in the pixel space of a tile matrix with the
    /// given scale and top left corner.
    fn tile_matrix_bounds(&self, scale: f64, map_top_left: Point) -> PixelRect;
}

// =============================================================================
// Web Mercator View
// =============================================================================

/// Unrotated web mercator view centered on a projected point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// View center in projected meters
    pub center: Point,

    /// Continuous zoom level
    pub zoom_level: f64,

    /// Viewport width in pixels
    pub width: f64,

    /// Viewport height in pixels
    pub height: f64,
}

impl MapView {
    pub fn new(center: Point, zoom_level: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom_level,
            width,
            height,
        }
    }

    /// Create a view centered on a geographic location.
    pub fn from_lat_lon(latitude: f64, longitude: f64, zoom_level: f64, width: f64, height: f64) -> Self {
        Self::new(lat_lon_to_map(latitude, longitude), zoom_level, width, height)
    }

    /// Scale of the view itself
    pub fn view_scale(&self) -> f64 {
        self.zoom_level_to_scale(self.zoom_level)
    }
}

impl ViewTransform for MapView {
    fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    fn view_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn zoom_level_to_scale(&self, zoom_level: f64) -> f64 {
        TILE_SIZE as f64 * 2f64.powf(zoom_level) / (360.0 * METERS_PER_DEGREE)
    }

    fn scale_to_zoom_level(&self, scale: f64) -> f64 {
        (scale * 360.0 * METERS_PER_DEGREE / TILE_SIZE as f64).log2()
    }

    fn tile_matrix_bounds(&self, scale: f64, map_top_left: Point) -> PixelRect {
        // Half extent of the viewport, converted from view pixels to matrix pixels
        let ratio = scale / self.view_scale();
        let half_w = self.width * ratio / 2.0;
        let half_h = self.height * ratio / 2.0;

        let cx = (self.center.x - map_top_left.x) * scale;
        let cy = (map_top_left.y - self.center.y) * scale;

        PixelRect {
            x_min: cx - half_w,
            y_min: cy - half_h,
            x_max: cx + half_w,
            y_max: cy + half_h,
        }
    }
}

/// Project a geographic location onto web mercator meters.
pub fn lat_lon_to_map(latitude: f64, longitude: f64) -> Point {
    let lat = latitude.clamp(-85.051_128_78, 85.051_128_78);
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    Point::new(longitude * METERS_PER_DEGREE, y)
}
