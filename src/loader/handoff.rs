//! Delivery of loaded images to the display context.
//!
//! Workers finish on the runtime's threads. Displays that must apply images
//! on their own thread use a [`ChannelHandoff`] and drain the receiver there;
//! everything else can use [`DirectHandoff`].

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::tile::{Tile, TileImage};

/// Hands a decoded image to whoever displays the tile.
pub trait ImageHandoff: Send + Sync {
    /// Deliver `image` for `tile`. Returns `false` when the display context
    /// is gone; the loader then marks the tile pending again so a later
    /// update retries it.
    fn deliver(&self, tile: Arc<Tile>, image: TileImage) -> bool;
}

/// Sets the image on the tile immediately, from the worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectHandoff;

impl ImageHandoff for DirectHandoff {
    fn deliver(&self, tile: Arc<Tile>, image: TileImage) -> bool {
        tile.set_image(Some(image));
        true
    }
}

/// An image waiting to be applied to its tile.
#[derive(Debug)]
pub struct TileDelivery {
    pub tile: Arc<Tile>,
    pub image: TileImage,
}

impl TileDelivery {
    /// Set the image on the tile.
    pub fn apply(self) {
        self.tile.set_image(Some(self.image));
    }
}

/// Queues images on a channel for the display context to apply.
#[derive(Debug, Clone)]
pub struct ChannelHandoff {
    sender: mpsc::UnboundedSender<TileDelivery>,
}

impl ChannelHandoff {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TileDelivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ImageHandoff for ChannelHandoff {
    fn deliver(&self, tile: Arc<Tile>, image: TileImage) -> bool {
        self.sender.send(TileDelivery { tile, image }).is_ok()
    }
}
