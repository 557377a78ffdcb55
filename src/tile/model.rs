//! Tile identity and load state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::matrix::TileMatrix;

// =============================================================================
// Tile Key
// =============================================================================

/// Identity of a tile: zoom level, signed column and row.
///
/// `x` is the on-screen column and may lie outside `[0, 2^z)`. Use
/// [`x_index`](Self::x_index) for cache keys and fetch addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub zoom_level: u32,
    pub x: i32,
    pub y: i32,
}

impl TileKey {
    pub fn new(zoom_level: u32, x: i32, y: i32) -> Self {
        Self { zoom_level, x, y }
    }

    /// Column wrapped into `[0, 2^z)`.
    pub fn x_index(&self) -> i32 {
        self.x.rem_euclid(TileMatrix::row_count(self.zoom_level))
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom_level, self.x, self.y)
    }
}

// =============================================================================
// Tile Image
// =============================================================================

/// Tile payload handed to the display layer.
///
/// Bytes are kept encoded; only the header is inspected to learn the format
/// and pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    pub data: Bytes,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// Tile
// =============================================================================

/// A tile tracked by a layer, shared with loader workers through `Arc`.
#[derive(Debug)]
pub struct Tile {
    key: TileKey,
    pending: AtomicBool,
    image: RwLock<Option<TileImage>>,
}

impl Tile {
    /// Create a tile waiting for its image.
    pub fn new(zoom_level: u32, x: i32, y: i32) -> Self {
        Self::with_key(TileKey::new(zoom_level, x, y))
    }

    pub fn with_key(key: TileKey) -> Self {
        Self {
            key,
            pending: AtomicBool::new(true),
            image: RwLock::new(None),
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn zoom_level(&self) -> u32 {
        self.key.zoom_level
    }

    pub fn x(&self) -> i32 {
        self.key.x
    }

    pub fn y(&self) -> i32 {
        self.key.y
    }

    pub fn x_index(&self) -> i32 {
        self.key.x_index()
    }

    /// Whether the tile still needs to be loaded.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::Release);
    }

    /// Store the loaded image and mark the tile as done.
    pub fn set_image(&self, image: Option<TileImage>) {
        self.store(image);
        self.set_pending(false);
    }

    /// Show a placeholder image taken from an equivalent tile.
    ///
    /// The tile stays pending so the real image is still fetched.
    pub fn seed_image(&self, image: TileImage) {
        self.store(Some(image));
    }

    /// Current image, if any.
    pub fn image(&self) -> Option<TileImage> {
        match self.image.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn has_image(&self) -> bool {
        match self.image.read() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    fn store(&self, image: Option<TileImage>) {
        match self.image.write() {
            Ok(mut guard) => *guard = image,
            Err(poisoned) => *poisoned.into_inner() = image,
        }
    }
}
