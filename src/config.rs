//! Configuration for the tile loader.
//!
//! Library configuration is carried by two plain structs with documented
//! defaults:
//!
//! - [`LoaderConfig`]: worker count and cache expiration policy of the
//!   [`TileImageLoader`](crate::loader::TileImageLoader)
//! - [`TileLayerOptions`]: zoom range and background levels of a
//!   [`TileLayer`](crate::tile::TileLayer)
//!
//! The `tile-loader` binary reads the same settings from the command line
//! through [`Cli`], with environment variables using the `TILE_` prefix:
//!
//! - `TILE_SOURCE` - URL template of the tile source
//! - `TILE_SOURCE_NAME` - Cache namespace of the source (default: tiles)
//! - `TILE_CACHE_DIR` - File cache directory (memory cache when unset)
//! - `TILE_CACHE_DB` - SQLite cache database, instead of a cache directory
//! - `TILE_MAX_LOAD_TASKS` - Concurrent tile loads (default: 4)
//! - `TILE_DEFAULT_EXPIRATION` - Expiration without max-age, seconds (default: 86400)
//! - `TILE_MAX_EXPIRATION` - Upper bound on expiration, seconds (default: 864000)
//! - `TILE_HTTP_TIMEOUT` - HTTP request timeout, seconds (default: 30)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::source::{TileSource, TmsTileSource, UrlTileSource};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of tiles loaded concurrently.
pub const DEFAULT_MAX_LOAD_TASKS: usize = 4;

/// Expiration used when a response carries no max-age (1 day).
pub const DEFAULT_CACHE_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on any cache expiration (10 days).
pub const MAX_CACHE_EXPIRATION: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default highest zoom level a layer loads.
pub const DEFAULT_MAX_ZOOM_LEVEL: u32 = 19;

/// Default number of coarser levels a base layer keeps below the current one.
pub const DEFAULT_MAX_BACKGROUND_LEVELS: u32 = 8;

/// Default cache namespace for the command line tool.
pub const DEFAULT_SOURCE_NAME: &str = "tiles";

// =============================================================================
// Loader Configuration
// =============================================================================

/// Settings of a [`TileImageLoader`](crate::loader::TileImageLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of tiles loaded at the same time
    pub max_load_tasks: usize,

    /// Expiration of cached tiles whose response had no max-age
    pub default_cache_expiration: Duration,

    /// Upper bound on the expiration of cached tiles
    pub max_cache_expiration: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_load_tasks: DEFAULT_MAX_LOAD_TASKS,
            default_cache_expiration: DEFAULT_CACHE_EXPIRATION,
            max_cache_expiration: MAX_CACHE_EXPIRATION,
        }
    }
}

impl LoaderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_load_tasks == 0 {
            return Err("max_load_tasks must be greater than 0".to_string());
        }

        if self.max_cache_expiration.is_zero() {
            return Err("max_cache_expiration must be greater than 0".to_string());
        }

        if self.default_cache_expiration > self.max_cache_expiration {
            return Err(
                "default_cache_expiration must not exceed max_cache_expiration".to_string(),
            );
        }

        Ok(())
    }

    /// How long a freshly fetched tile stays valid.
    ///
    /// A missing max-age falls back to the default; a larger one is cut down
    /// to the maximum.
    pub fn expiration_for(&self, max_age: Option<Duration>) -> Duration {
        match max_age {
            None => self.default_cache_expiration,
            Some(age) => age.min(self.max_cache_expiration),
        }
    }
}

// =============================================================================
// Layer Options
// =============================================================================

/// Zoom range and background behavior of a tile layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerOptions {
    pub tile_size: u32,
    pub min_zoom_level: u32,
    pub max_zoom_level: u32,

    /// Coarser levels kept below the current one by a base layer
    pub max_background_levels: u32,

    /// Base layers show background levels; overlays only the current level
    pub is_base_layer: bool,
}

impl Default for TileLayerOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            min_zoom_level: 0,
            max_zoom_level: DEFAULT_MAX_ZOOM_LEVEL,
            max_background_levels: DEFAULT_MAX_BACKGROUND_LEVELS,
            is_base_layer: true,
        }
    }
}

impl TileLayerOptions {
    /// Options for an overlay layer.
    pub fn overlay() -> Self {
        Self {
            is_base_layer: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }

        if self.min_zoom_level > self.max_zoom_level {
            return Err(format!(
                "min_zoom_level ({}) must not exceed max_zoom_level ({})",
                self.min_zoom_level, self.max_zoom_level
            ));
        }

        if self.max_zoom_level > crate::matrix::MAX_ZOOM_LEVEL {
            return Err(format!(
                "max_zoom_level must not exceed {}",
                crate::matrix::MAX_ZOOM_LEVEL
            ));
        }

        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Loader - fetch and cache slippy-map tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-loader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load every tile covering a viewport into the cache.
    Fetch(FetchConfig),

    /// Remove expired entries from a file cache.
    Clean(CleanConfig),

    /// Print the address of a single tile.
    Uri(UriConfig),
}

/// Tile source options shared by commands.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// URL template with {x}, {y}, {z} and optional {s} placeholders.
    #[arg(long, env = "TILE_SOURCE")]
    pub source: String,

    /// Subdomains substituted for {s} (comma-separated).
    #[arg(long, env = "TILE_SUBDOMAINS", value_delimiter = ',')]
    pub subdomains: Option<Vec<String>>,

    /// Count rows from the bottom (TMS).
    #[arg(long, default_value_t = false)]
    pub tms: bool,
}

impl SourceArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.source.trim().is_empty() {
            return Err("Tile source is required. Set --source or TILE_SOURCE".to_string());
        }
        Ok(())
    }

    /// Build the configured tile source.
    pub fn tile_source(&self) -> Arc<dyn TileSource> {
        let source = match &self.subdomains {
            Some(subdomains) => UrlTileSource::with_subdomains(&self.source, subdomains.clone()),
            None => UrlTileSource::new(&self.source),
        };

        if self.tms {
            Arc::new(TmsTileSource::from_source(source))
        } else {
            Arc::new(source)
        }
    }
}

/// Configuration for the `fetch` command.
#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Cache namespace of the source.
    #[arg(long, default_value = DEFAULT_SOURCE_NAME, env = "TILE_SOURCE_NAME")]
    pub name: String,

    /// Latitude of the view center.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude of the view center.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Continuous zoom level of the view.
    #[arg(long)]
    pub zoom: f64,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = 1024.0)]
    pub width: f64,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = 768.0)]
    pub height: f64,

    // =========================================================================
    // Layer Configuration
    // =========================================================================
    /// Lowest zoom level to load.
    #[arg(long, default_value_t = 0)]
    pub min_zoom: u32,

    /// Highest zoom level to load.
    #[arg(long, default_value_t = DEFAULT_MAX_ZOOM_LEVEL)]
    pub max_zoom: u32,

    /// Coarser levels loaded below the current one.
    #[arg(long, default_value_t = DEFAULT_MAX_BACKGROUND_LEVELS)]
    pub max_background_levels: u32,

    /// Load only the current zoom level, as an overlay layer would.
    #[arg(long, default_value_t = false)]
    pub overlay: bool,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// File cache directory. Tiles are cached in memory when not set.
    #[arg(long, env = "TILE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// SQLite cache database, or a directory to create TileCache.sqlite in.
    #[arg(long, env = "TILE_CACHE_DB", conflicts_with = "cache_dir")]
    pub cache_db: Option<PathBuf>,

    /// Disable caching entirely.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Expiration of tiles without max-age, in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_EXPIRATION.as_secs(), env = "TILE_DEFAULT_EXPIRATION")]
    pub default_expiration: u64,

    /// Upper bound on tile expiration, in seconds.
    #[arg(long, default_value_t = MAX_CACHE_EXPIRATION.as_secs(), env = "TILE_MAX_EXPIRATION")]
    pub max_expiration: u64,

    // =========================================================================
    // Loader Configuration
    // =========================================================================
    /// Maximum number of concurrent tile loads.
    #[arg(long, default_value_t = DEFAULT_MAX_LOAD_TASKS, env = "TILE_MAX_LOAD_TASKS")]
    pub max_load_tasks: usize,

    /// HTTP request timeout in seconds.
    #[arg(long, default_value_t = 30, env = "TILE_HTTP_TIMEOUT")]
    pub timeout: u64,

    /// Print the load report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl FetchConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;

        if !(-90.0..=90.0).contains(&self.lat) {
            return Err("lat must be between -90 and 90".to_string());
        }

        if !(self.width > 0.0 && self.height > 0.0) {
            return Err("width and height must be greater than 0".to_string());
        }

        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        self.loader_config().validate()?;
        self.layer_options().validate()?;

        Ok(())
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_load_tasks: self.max_load_tasks,
            default_cache_expiration: Duration::from_secs(self.default_expiration),
            max_cache_expiration: Duration::from_secs(self.max_expiration),
        }
    }

    pub fn layer_options(&self) -> TileLayerOptions {
        TileLayerOptions {
            tile_size: DEFAULT_TILE_SIZE,
            min_zoom_level: self.min_zoom,
            max_zoom_level: self.max_zoom,
            max_background_levels: self.max_background_levels,
            is_base_layer: !self.overlay,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Configuration for the `clean` command.
#[derive(Args, Debug, Clone)]
pub struct CleanConfig {
    /// File cache directory.
    #[arg(long, env = "TILE_CACHE_DIR", required_unless_present = "cache_db")]
    pub cache_dir: Option<PathBuf>,

    /// SQLite cache database.
    #[arg(long, env = "TILE_CACHE_DB", conflicts_with = "cache_dir")]
    pub cache_db: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Configuration for the `uri` command.
#[derive(Args, Debug, Clone)]
pub struct UriConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Tile column.
    #[arg(allow_hyphen_values = true)]
    pub x: i32,

    /// Tile row.
    pub y: i32,

    /// Zoom level.
    pub z: u32,
}

// =============================================================================
// Tests
// =============================================================================
