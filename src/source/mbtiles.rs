//! MBTiles tile source.
//!
//! An MBTiles file is a SQLite database with a `metadata` name/value table and
//! a `tiles` table keyed by zoom level, column and row. Rows are counted from
//! the bottom, as in TMS. The file is opened read-only; tiles are read
//! straight from it and never go through an image cache.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};
use url::Url;

use crate::config::TileLayerOptions;
use crate::error::{FetchError, SourceError};
use crate::io::HttpFetcher;

use super::TileSource;

/// Tile formats that can be decoded for display
pub const SUPPORTED_FORMATS: [&str; 2] = ["png", "jpg"];

/// Read-only tile source over an MBTiles database.
pub struct MbTilesSource {
    pool: Pool<Sqlite>,
    metadata: HashMap<String, String>,
}

impl MbTilesSource {
    /// Open the MBTiles file at `path` and read its metadata.
    ///
    /// Files whose `format` is not png or jpg are rejected.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT name, value FROM metadata")
                .fetch_all(&pool)
                .await?;

        let metadata: HashMap<String, String> = rows
            .into_iter()
            .map(|(name, value)| (name, value.unwrap_or_default()))
            .collect();

        let format = metadata.get("format").map(String::as_str).unwrap_or_default();
        if !SUPPORTED_FORMATS.contains(&format) {
            warn!(path = %path.display(), format, "Unsupported MBTiles format");
            pool.close().await;
            return Err(SourceError::UnsupportedFormat(format.to_string()));
        }

        debug!(path = %path.display(), format, entries = metadata.len(), "Opened MBTiles");

        Ok(Self { pool, metadata })
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn format(&self) -> &str {
        self.metadata.get("format").map(String::as_str).unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").map(String::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata.get("description").map(String::as_str)
    }

    pub fn min_zoom(&self) -> Option<u32> {
        self.zoom_entry("minzoom")
    }

    pub fn max_zoom(&self) -> Option<u32> {
        self.zoom_entry("maxzoom")
    }

    fn zoom_entry(&self, name: &str) -> Option<u32> {
        self.metadata.get(name)?.trim().parse().ok()
    }

    /// `options` with the zoom range declared by the file, where present.
    pub fn layer_options(&self, options: TileLayerOptions) -> TileLayerOptions {
        TileLayerOptions {
            min_zoom_level: self.min_zoom().unwrap_or(options.min_zoom_level),
            max_zoom_level: self.max_zoom().unwrap_or(options.max_zoom_level),
            ..options
        }
    }

    /// Payload of the tile at column `x`, row `y` counted from the top.
    pub async fn read_tile(
        &self,
        x: i32,
        y: i32,
        zoom_level: u32,
    ) -> Result<Option<Bytes>, FetchError> {
        let Some(rows) = 1i64.checked_shl(zoom_level) else {
            return Ok(None);
        };

        let data: Option<Option<Vec<u8>>> = sqlx::query_scalar(
            "SELECT tile_data FROM tiles WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
        )
        .bind(zoom_level as i64)
        .bind(x as i64)
        .bind(rows - 1 - y as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FetchError::Io(format!("MBTiles {zoom_level}/{x}/{y}: {e}")))?;

        Ok(data.flatten().map(Bytes::from))
    }
}

#[async_trait]
impl TileSource for MbTilesSource {
    /// Tiles are not addressable outside the database.
    fn uri(&self, _x: i32, _y: i32, _zoom_level: u32) -> Option<Url> {
        None
    }

    async fn load_buffer(
        &self,
        x: i32,
        y: i32,
        zoom_level: u32,
        _fetcher: &dyn HttpFetcher,
    ) -> Result<Bytes, FetchError> {
        Ok(self.read_tile(x, y, zoom_level).await?.unwrap_or_default())
    }
}
