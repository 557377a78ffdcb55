use serde::{Deserialize, Serialize};

use super::view::{PixelRect, Point, ViewTransform};

/// Bias added to the continuous zoom before flooring.
///
/// Keeps views sitting at an integer zoom from flickering to the level below
/// through floating point error.
pub const ZOOM_EPSILON: f64 = 0.001;

/// Highest zoom level whose index range fits in `i32`
pub const MAX_ZOOM_LEVEL: u32 = 30;

/// Inclusive range of tile indices covering a viewport at one zoom level.
///
/// Rows are clamped to `[0, 2^z - 1]`. Columns are not clamped and may be
/// negative or exceed the column count so that panning across the
/// antimeridian stays continuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileMatrix {
    pub zoom_level: u32,
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl TileMatrix {
    /// Compute the tile matrix for the current view.
    ///
    /// Returns `None` when the viewport has no area or the tile size is zero;
    /// callers treat that as "nothing to show".
    pub fn compute<V: ViewTransform + ?Sized>(
        view: &V,
        tile_size: u32,
        map_top_left: Point,
    ) -> Option<Self> {
        let (width, height) = view.view_size();

        if tile_size == 0 || !(width > 0.0 && height > 0.0) {
            return None;
        }

        let zoom_level = Self::zoom_level_for(view.zoom_level());
        let scale = view.zoom_level_to_scale(zoom_level as f64);
        let bounds = view.tile_matrix_bounds(scale, map_top_left);

        Some(Self::from_pixel_bounds(zoom_level, bounds, tile_size))
    }

    /// Integer zoom level used for a continuous view zoom.
    pub fn zoom_level_for(view_zoom: f64) -> u32 {
        let zoom = (view_zoom + ZOOM_EPSILON).floor();

        if zoom.is_nan() || zoom < 0.0 {
            0
        } else {
            (zoom as u32).min(MAX_ZOOM_LEVEL)
        }
    }

    /// Build a matrix from pixel bounds in tile matrix space.
    pub fn from_pixel_bounds(zoom_level: u32, bounds: PixelRect, tile_size: u32) -> Self {
        let zoom_level = zoom_level.min(MAX_ZOOM_LEVEL);
        let size = tile_size.max(1) as f64;
        let max_row = Self::row_count(zoom_level) - 1;

        let y_min = (bounds.y_min / size).floor() as i32;
        let y_max = (bounds.y_max / size).floor() as i32;

        Self {
            zoom_level,
            x_min: (bounds.x_min / size).floor() as i32,
            y_min: y_min.clamp(0, max_row),
            x_max: (bounds.x_max / size).floor() as i32,
            y_max: y_max.clamp(0, max_row),
        }
    }

    /// Number of rows (and distinct columns) at a zoom level.
    pub fn row_count(zoom_level: u32) -> i32 {
        1 << zoom_level.min(MAX_ZOOM_LEVEL)
    }

    /// Number of columns covered, including wrapped ones.
    pub fn width(&self) -> u32 {
        (self.x_max - self.x_min + 1).max(0) as u32
    }

    /// Number of rows covered.
    pub fn height(&self) -> u32 {
        (self.y_max - self.y_min + 1).max(0) as u32
    }

    /// Index range covering the same area at a coarser zoom level.
    ///
    /// Both column bounds use floor division so negative columns map onto
    /// the coarse tile that contains them; rows are clamped to the coarser
    /// level.
    pub fn at_zoom_level(&self, zoom_level: u32) -> TileMatrix {
        if zoom_level >= self.zoom_level {
            return *self;
        }

        let factor = 1i32 << (self.zoom_level - zoom_level);
        let max_row = Self::row_count(zoom_level) - 1;

        TileMatrix {
            zoom_level,
            x_min: self.x_min.div_euclid(factor),
            y_min: (self.y_min / factor).clamp(0, max_row),
            x_max: self.x_max.div_euclid(factor),
            y_max: (self.y_max / factor).clamp(0, max_row),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

// =============================================================================
// Tests
// =============================================================================
