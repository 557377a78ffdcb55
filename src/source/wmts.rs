//! WMTS tile source.
//!
//! WMTS services describe their pyramid as a tile matrix set: an ordered list
//! of matrices, each with its own scale, origin, tile size and extent. The
//! zoom level of a [`Tile`](crate::tile::Tile) served by this source is the
//! index of its matrix within the set.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::matrix::{Point, TileMatrix, ViewTransform, MAP_TOP_LEFT, METERS_PER_DEGREE};

use super::template::parse_address;
use super::{is_http, TileSource};

/// Size of a rendering pixel in meters, as defined by OGC
pub const STANDARD_PIXEL_SIZE: f64 = 0.000_28;

/// Tolerance applied when comparing matrix scales with the view scale
const SCALE_TOLERANCE: f64 = 1.001;

/// One matrix of a WMTS tile matrix set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmtsTileMatrix {
    pub identifier: String,

    /// Pixels per projected meter
    pub scale: f64,

    /// Top left corner in projected meters
    pub top_left: Point,

    pub tile_width: u32,
    pub tile_height: u32,
    pub matrix_width: u32,
    pub matrix_height: u32,
}

impl WmtsTileMatrix {
    /// Build a matrix from the scale denominator published in capabilities.
    pub fn from_scale_denominator(
        identifier: impl Into<String>,
        scale_denominator: f64,
        top_left: Point,
        tile_size: (u32, u32),
        matrix_size: (u32, u32),
    ) -> Self {
        Self {
            identifier: identifier.into(),
            scale: 1.0 / (scale_denominator * STANDARD_PIXEL_SIZE),
            top_left,
            tile_width: tile_size.0,
            tile_height: tile_size.1,
            matrix_width: matrix_size.0,
            matrix_height: matrix_size.1,
        }
    }

    /// Visible tile range of this matrix, clamped to its extent.
    ///
    /// Returns `None` when the view does not intersect the matrix.
    pub fn visible_range<V: ViewTransform + ?Sized>(
        &self,
        view: &V,
        zoom_level: u32,
    ) -> Option<TileMatrix> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return None;
        }

        let bounds = view.tile_matrix_bounds(self.scale, self.top_left);
        let tw = self.tile_width as f64;
        let th = self.tile_height as f64;

        let x_min = ((bounds.x_min / tw).floor() as i64).max(0);
        let y_min = ((bounds.y_min / th).floor() as i64).max(0);
        let x_max = ((bounds.x_max / tw).floor() as i64).min(self.matrix_width as i64 - 1);
        let y_max = ((bounds.y_max / th).floor() as i64).min(self.matrix_height as i64 - 1);

        if x_min > x_max || y_min > y_max {
            return None;
        }

        Some(TileMatrix {
            zoom_level,
            x_min: x_min as i32,
            y_min: y_min as i32,
            x_max: x_max as i32,
            y_max: y_max as i32,
        })
    }
}

/// Ordered set of WMTS tile matrices, from the coarsest to the finest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmtsTileMatrixSet {
    pub identifier: String,
    pub supported_crs: String,
    matrices: Vec<WmtsTileMatrix>,
}

impl WmtsTileMatrixSet {
    /// Create a set, ordering the matrices by increasing scale.
    pub fn new(
        identifier: impl Into<String>,
        supported_crs: impl Into<String>,
        mut matrices: Vec<WmtsTileMatrix>,
    ) -> Self {
        matrices.sort_by(|a, b| a.scale.total_cmp(&b.scale));

        Self {
            identifier: identifier.into(),
            supported_crs: supported_crs.into(),
            matrices,
        }
    }

    /// The standard web mercator set with one 256 pixel matrix per zoom level.
    pub fn web_mercator_quad(identifier: impl Into<String>, max_zoom_level: u32) -> Self {
        let max_zoom_level = max_zoom_level.min(crate::matrix::MAX_ZOOM_LEVEL);

        let matrices = (0..=max_zoom_level)
            .map(|z| {
                let n = TileMatrix::row_count(z) as u32;
                WmtsTileMatrix {
                    identifier: z.to_string(),
                    scale: 256.0 * n as f64 / (360.0 * METERS_PER_DEGREE),
                    top_left: MAP_TOP_LEFT,
                    tile_width: 256,
                    tile_height: 256,
                    matrix_width: n,
                    matrix_height: n,
                }
            })
            .collect();

        Self::new(identifier, "EPSG:3857", matrices)
    }

    pub fn matrices(&self) -> &[WmtsTileMatrix] {
        &self.matrices
    }

    pub fn get(&self, zoom_level: u32) -> Option<&WmtsTileMatrix> {
        self.matrices.get(zoom_level as usize)
    }

    /// Matrices to display at a view scale.
    ///
    /// All matrices not finer than the view are candidates, the coarsest one
    /// always included. A base layer keeps the finest
    /// `max_background_levels + 1` of them; an overlay keeps only the finest.
    /// Each matrix is returned with its index in the set.
    pub fn current_matrices(
        &self,
        view_scale: f64,
        max_background_levels: u32,
        is_base_layer: bool,
    ) -> Vec<(u32, &WmtsTileMatrix)> {
        let max_scale = SCALE_TOLERANCE * view_scale;

        let candidates: Vec<(u32, &WmtsTileMatrix)> = self
            .matrices
            .iter()
            .enumerate()
            .filter(|(i, matrix)| *i == 0 || matrix.scale <= max_scale)
            .map(|(i, matrix)| (i as u32, matrix))
            .collect();

        let keep = if is_base_layer {
            max_background_levels as usize + 1
        } else {
            1
        };

        let skip = candidates.len().saturating_sub(keep);
        candidates.into_iter().skip(skip).collect()
    }
}

// =============================================================================
// WMTS Tile Source
// =============================================================================

/// Tile source resolving a WMTS REST template against a tile matrix set.
///
/// Placeholders: `{TileMatrixSet}`, `{TileMatrix}`, `{TileCol}`, `{TileRow}`.
#[derive(Debug, Clone, PartialEq)]
pub struct WmtsTileSource {
    template: String,
    matrix_set: WmtsTileMatrixSet,
}

impl WmtsTileSource {
    pub fn new(template: impl Into<String>, matrix_set: WmtsTileMatrixSet) -> Self {
        Self {
            template: template.into(),
            matrix_set,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn matrix_set(&self) -> &WmtsTileMatrixSet {
        &self.matrix_set
    }

    /// Tile ranges to load for the current view, one per displayed matrix.
    pub fn tile_matrices<V: ViewTransform + ?Sized>(
        &self,
        view: &V,
        max_background_levels: u32,
        is_base_layer: bool,
    ) -> Vec<TileMatrix> {
        let (width, height) = view.view_size();
        if !(width > 0.0 && height > 0.0) {
            return Vec::new();
        }

        let view_scale = view.zoom_level_to_scale(view.zoom_level());

        self.matrix_set
            .current_matrices(view_scale, max_background_levels, is_base_layer)
            .into_iter()
            .filter_map(|(index, matrix)| matrix.visible_range(view, index))
            .collect()
    }

    /// Cache namespace of this source: the layer name scoped by matrix set.
    pub fn cache_namespace(&self, source_name: &str) -> String {
        format!(
            "{}/{}",
            source_name,
            sanitize_namespace(&self.matrix_set.identifier)
        )
    }
}

impl TileSource for WmtsTileSource {
    fn uri(&self, x: i32, y: i32, zoom_level: u32) -> Option<Url> {
        let matrix = self.matrix_set.get(zoom_level)?;

        if x < 0 || y < 0 || x as u32 >= matrix.matrix_width || y as u32 >= matrix.matrix_height {
            return None;
        }

        let address = self
            .template
            .replace("{TileMatrixSet}", &self.matrix_set.identifier)
            .replace("{TileMatrix}", &matrix.identifier)
            .replace("{TileCol}", &x.to_string())
            .replace("{TileRow}", &y.to_string());

        parse_address(&address)
    }

    fn is_cacheable(&self) -> bool {
        is_http(&self.template)
    }
}

/// Replace characters that would split a namespace into path components.
pub fn sanitize_namespace(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| match c {
            ':' | ';' | ',' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}
