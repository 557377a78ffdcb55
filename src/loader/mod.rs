//! Concurrent tile image loading.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     TileImageLoader                      │
//! │                                                          │
//! │   PendingStack ──pop──▶ worker 1 ┐                       │
//! │   (latest batch)  ──pop──▶ worker 2 ├─▶ TileSource       │
//! │                   ──pop──▶ ...      │   HttpFetcher      │
//! │                   ──pop──▶ worker N ┘   ImageCache       │
//! │                                 │                        │
//! │                                 ▼                        │
//! │                      TileDecoder ─▶ ImageHandoff         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! `N` is the smaller of the configured `max_load_tasks` and the number of
//! pending tiles. Starting a new batch clears the stack of the previous one,
//! so its workers run out of tiles and exit.

mod handoff;
mod pending;
mod service;

pub use handoff::{ChannelHandoff, DirectHandoff, ImageHandoff, TileDelivery};
pub use pending::PendingStack;
pub use service::{LoadBatch, LoadReport, TileImageLoader};
