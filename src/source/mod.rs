//! Tile addressing strategies.
//!
//! A [`TileSource`] maps a wrapped tile index to the address its payload is
//! fetched from:
//!
//! - [`UrlTileSource`]: URL template with `{x}`, `{y}`, `{z}` and `{s}`
//!   placeholders, rotating over subdomains
//! - [`TmsTileSource`]: same template, rows counted from the bottom
//! - [`WmtsTileSource`]: WMTS REST template resolved against a tile matrix set
//! - [`MbTilesSource`]: tiles read from an MBTiles database
//!
//! Sources whose template is an `http`/`https` URL are cacheable; anything
//! else (local files) is read directly on every load.

mod mbtiles;
mod template;
mod tms;
mod wmts;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::FetchError;
use crate::io::HttpFetcher;

pub use mbtiles::{MbTilesSource, SUPPORTED_FORMATS};
pub use template::{UrlTileSource, DEFAULT_SUBDOMAINS};
pub use tms::TmsTileSource;
pub use wmts::{sanitize_namespace, WmtsTileMatrix, WmtsTileMatrixSet, WmtsTileSource};

/// Builds fetch addresses for tiles.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Address of the tile at wrapped column `x`, row `y`, or `None` when the
    /// source has nothing at that position.
    fn uri(&self, x: i32, y: i32, zoom_level: u32) -> Option<Url>;

    /// Whether fetched payloads may be stored in an image cache.
    fn is_cacheable(&self) -> bool {
        false
    }

    /// Load the payload of a tile directly, bypassing any cache.
    ///
    /// A tile without an address has no payload.
    async fn load_buffer(
        &self,
        x: i32,
        y: i32,
        zoom_level: u32,
        fetcher: &dyn HttpFetcher,
    ) -> Result<Bytes, FetchError> {
        match self.uri(x, y, zoom_level) {
            Some(uri) => load_uri(&uri, fetcher).await,
            None => Ok(Bytes::new()),
        }
    }
}

/// Read the payload at `uri` from disk or over HTTP.
pub async fn load_uri(uri: &Url, fetcher: &dyn HttpFetcher) -> Result<Bytes, FetchError> {
    match uri.scheme() {
        "http" | "https" => Ok(fetcher.get(uri).await?.buffer),
        "file" => {
            let path = uri
                .to_file_path()
                .map_err(|_| FetchError::Io(format!("invalid file URI: {uri}")))?;

            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                // A missing file is a missing tile, not an error
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Bytes::new()),
                Err(e) => Err(FetchError::Io(format!("{}: {e}", path.display()))),
            }
        }
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

/// Whether a template or address points at an HTTP(S) resource.
pub fn is_http(template: &str) -> bool {
    let lower = template.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
