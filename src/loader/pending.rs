use std::sync::{Arc, Mutex, MutexGuard};

use crate::tile::Tile;

/// Shared LIFO of tiles waiting for a worker.
///
/// Many workers pop concurrently; the loader replaces the whole stack when a
/// new batch starts and clears the old one to cancel its backlog. The lock is
/// never held across an await.
#[derive(Debug, Default)]
pub struct PendingStack {
    tiles: Mutex<Vec<Arc<Tile>>>,
}

impl PendingStack {
    /// Stack of the pending tiles in `tiles`, popping in list order.
    pub fn from_pending(tiles: &[Arc<Tile>]) -> Self {
        let stack = tiles
            .iter()
            .rev()
            .filter(|tile| tile.is_pending())
            .cloned()
            .collect();

        Self {
            tiles: Mutex::new(stack),
        }
    }

    pub fn pop(&self) -> Option<Arc<Tile>> {
        self.lock().pop()
    }

    /// Drop every queued tile, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut tiles = self.lock();
        let count = tiles.len();
        tiles.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Tile>>> {
        // Tiles are plain data; a panicking holder leaves the Vec consistent
        self.tiles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
