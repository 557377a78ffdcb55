//! Tile layers: which tiles a view needs, and when to load them.
//!
//! # Update cycle
//!
//! ```text
//! view changed
//!     │
//!     ▼
//! TileMatrix::compute ──same as last time──▶ nothing to do
//!     │ changed
//!     ▼
//! TileSet::rebuild
//!     │  z = min_z ..= max_z (coarse background first)
//!     │  reuse tracked tiles, create new ones pending,
//!     │  seed new ones from an equivalent wrapped column
//!     ▼
//! TileImageLoader::load_tiles(tiles, source, source_name)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::TileLayerOptions;
use crate::loader::{LoadBatch, TileImageLoader};
use crate::matrix::{Point, TileMatrix, ViewTransform, MAP_TOP_LEFT};
use crate::source::{TileSource, WmtsTileSource};

use super::model::{Tile, TileImage, TileKey};

// =============================================================================
// Tile Set
// =============================================================================

/// Tiles tracked by a layer, in enumeration order.
#[derive(Debug, Default, Clone)]
pub struct TileSet {
    tiles: Vec<Arc<Tile>>,
    index: HashMap<TileKey, usize>,
}

impl TileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, key: &TileKey) -> Option<&Arc<Tile>> {
        self.index.get(key).map(|&i| &self.tiles[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tile>> {
        self.tiles.iter()
    }

    /// Zoom levels to enumerate for `matrix`, coarsest first.
    ///
    /// Returns `None` when the range is empty: the reference level capped at
    /// the layer's maximum lies below its minimum, or a base layer's
    /// background would start above the cap.
    pub fn zoom_range(matrix: &TileMatrix, options: &TileLayerOptions) -> Option<(u32, u32)> {
        let max_z = matrix.zoom_level.min(options.max_zoom_level);

        if max_z < options.min_zoom_level {
            return None;
        }

        let min_z = if options.is_base_layer {
            matrix
                .zoom_level
                .saturating_sub(options.max_background_levels)
                .max(options.min_zoom_level)
        } else {
            max_z
        };

        (min_z <= max_z).then_some((min_z, max_z))
    }

    /// Tiles required to show `matrix`, background levels included.
    pub fn rebuild(&self, matrix: &TileMatrix, options: &TileLayerOptions) -> TileSet {
        let matrices: Vec<TileMatrix> = match Self::zoom_range(matrix, options) {
            Some((min_z, max_z)) => (min_z..=max_z).map(|z| matrix.at_zoom_level(z)).collect(),
            None => Vec::new(),
        };

        self.build(&matrices)
    }

    /// Tiles covering each of `matrices`, in the given order.
    ///
    /// Tiles already in `self` are carried over with their state.
    pub fn build(&self, matrices: &[TileMatrix]) -> TileSet {
        let equivalents = self.equivalent_images();
        let mut set = TileSet::new();

        for matrix in matrices {
            for y in matrix.y_min..=matrix.y_max {
                for x in matrix.x_min..=matrix.x_max {
                    let key = TileKey::new(matrix.zoom_level, x, y);

                    if set.index.contains_key(&key) {
                        continue;
                    }

                    let tile = match self.get(&key) {
                        Some(tile) => tile.clone(),
                        None => {
                            let tile = Tile::with_key(key);
                            let wrapped = (key.zoom_level, key.x_index(), key.y);
                            if let Some(Some(image)) = equivalents.get(&wrapped) {
                                tile.seed_image(image.clone());
                            }
                            Arc::new(tile)
                        }
                    };

                    set.push(tile);
                }
            }
        }

        set
    }

    fn push(&mut self, tile: Arc<Tile>) {
        self.index.insert(tile.key(), self.tiles.len());
        self.tiles.push(tile);
    }

    /// Image of the first tile per (zoom, wrapped column, row).
    ///
    /// Only the first tile counts, whether or not it has an image or is
    /// still pending.
    fn equivalent_images(&self) -> HashMap<(u32, i32, i32), Option<TileImage>> {
        let mut images = HashMap::new();

        for tile in &self.tiles {
            images
                .entry((tile.zoom_level(), tile.x_index(), tile.y()))
                .or_insert_with(|| tile.image());
        }

        images
    }
}

// =============================================================================
// Tile Layer
// =============================================================================

/// A slippy-map layer backed by a [`TileSource`].
pub struct TileLayer {
    options: TileLayerOptions,
    loader: Arc<TileImageLoader>,
    source: Option<Arc<dyn TileSource>>,
    source_name: Option<String>,
    map_top_left: Point,
    matrix: Option<TileMatrix>,
    tiles: TileSet,
}

impl TileLayer {
    pub fn new(options: TileLayerOptions, loader: Arc<TileImageLoader>) -> Self {
        Self {
            options,
            loader,
            source: None,
            source_name: None,
            map_top_left: MAP_TOP_LEFT,
            matrix: None,
            tiles: TileSet::new(),
        }
    }

    /// Replace the tile source. `source_name` is the cache namespace; without
    /// one, tiles are never cached.
    ///
    /// Drops all tiles and forces the next update to reload.
    pub fn set_source(&mut self, source: Option<Arc<dyn TileSource>>, source_name: Option<String>) {
        self.source = source;
        self.source_name = source_name;
        self.reset();
    }

    /// Origin of tile index space in projected meters.
    pub fn set_map_top_left(&mut self, map_top_left: Point) {
        self.map_top_left = map_top_left;
        self.reset();
    }

    pub fn options(&self) -> &TileLayerOptions {
        &self.options
    }

    pub fn matrix(&self) -> Option<&TileMatrix> {
        self.matrix.as_ref()
    }

    pub fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    /// Bring the layer up to date with `view`.
    ///
    /// Returns the started batch, or `None` when the visible tile range did
    /// not change.
    pub fn update<V: ViewTransform + ?Sized>(&mut self, view: &V) -> Option<LoadBatch> {
        let matrix = TileMatrix::compute(view, self.options.tile_size, self.map_top_left);

        match matrix {
            None => {
                if self.matrix.is_none() && self.tiles.is_empty() {
                    return None;
                }
                self.matrix = None;
                self.tiles = TileSet::new();
            }
            Some(matrix) => {
                if self.matrix == Some(matrix) {
                    return None;
                }
                debug!(?matrix, "Tile matrix changed");
                // Without a source there is nothing to show
                self.tiles = match self.source {
                    Some(_) => self.tiles.rebuild(&matrix, &self.options),
                    None => TileSet::new(),
                };
                self.matrix = Some(matrix);
            }
        }

        Some(self.load())
    }

    /// Load all pending tiles again, e.g. after a failed batch.
    pub fn reload(&self) -> LoadBatch {
        self.load()
    }

    fn load(&self) -> LoadBatch {
        self.loader.load_tiles(
            self.tiles.tiles(),
            self.source.clone(),
            self.source_name.as_deref(),
        )
    }

    fn reset(&mut self) {
        self.matrix = None;
        self.tiles = TileSet::new();
    }
}

// =============================================================================
// WMTS Tile Layer
// =============================================================================

/// A layer whose tile ranges come from a WMTS tile matrix set.
///
/// Each displayed matrix contributes its own range; the zoom level of a tile
/// is the index of its matrix within the set.
pub struct WmtsTileLayer {
    options: TileLayerOptions,
    loader: Arc<TileImageLoader>,
    source: Option<Arc<WmtsTileSource>>,
    source_name: Option<String>,
    matrices: Vec<TileMatrix>,
    tiles: TileSet,
}

impl WmtsTileLayer {
    pub fn new(options: TileLayerOptions, loader: Arc<TileImageLoader>) -> Self {
        Self {
            options,
            loader,
            source: None,
            source_name: None,
            matrices: Vec::new(),
            tiles: TileSet::new(),
        }
    }

    pub fn set_source(&mut self, source: Option<Arc<WmtsTileSource>>, source_name: Option<String>) {
        self.source = source;
        self.source_name = source_name;
        self.matrices.clear();
        self.tiles = TileSet::new();
    }

    pub fn matrices(&self) -> &[TileMatrix] {
        &self.matrices
    }

    pub fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    /// Cache namespace of the current source, scoped by matrix set.
    pub fn cache_namespace(&self) -> Option<String> {
        let source = self.source.as_ref()?;
        let name = self.source_name.as_deref()?;
        Some(source.cache_namespace(name))
    }

    pub fn update<V: ViewTransform + ?Sized>(&mut self, view: &V) -> Option<LoadBatch> {
        let matrices = match &self.source {
            Some(source) => source.tile_matrices(
                view,
                self.options.max_background_levels,
                self.options.is_base_layer,
            ),
            None => Vec::new(),
        };

        if matrices == self.matrices {
            return None;
        }

        self.tiles = self.tiles.build(&matrices);
        self.matrices = matrices;

        let source = self
            .source
            .clone()
            .map(|source| source as Arc<dyn TileSource>);
        let namespace = self.cache_namespace();

        Some(
            self.loader
                .load_tiles(self.tiles.tiles(), source, namespace.as_deref()),
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
