use url::Url;

use crate::matrix::TileMatrix;

use super::{TileSource, UrlTileSource};

/// URL template source for TMS services, which count rows from the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmsTileSource {
    inner: UrlTileSource,
}

impl TmsTileSource {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            inner: UrlTileSource::new(template),
        }
    }

    pub fn from_source(inner: UrlTileSource) -> Self {
        Self { inner }
    }

    pub fn template(&self) -> &str {
        self.inner.template()
    }

    /// Row as counted by the TMS service.
    pub fn flip_row(y: i32, zoom_level: u32) -> i32 {
        TileMatrix::row_count(zoom_level) - 1 - y
    }
}

impl TileSource for TmsTileSource {
    fn uri(&self, x: i32, y: i32, zoom_level: u32) -> Option<Url> {
        self.inner.uri(x, Self::flip_row(y, zoom_level), zoom_level)
    }

    fn is_cacheable(&self) -> bool {
        self.inner.is_cacheable()
    }
}
