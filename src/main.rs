//! Tile Loader - fetch and cache slippy-map tiles from the command line.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_loader::{
    cache::{FileCache, ImageCache, MemoryCache, SqliteCache},
    config::{CleanConfig, Cli, Command, FetchConfig, UriConfig},
    io::ReqwestFetcher,
    loader::{LoadReport, TileImageLoader},
    matrix::MapView,
    source::TileSource,
    tile::TileLayer,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Fetch(config) => run_fetch(config).await,
        Command::Clean(config) => run_clean(config).await,
        Command::Uri(config) => run_uri(config),
    }
}

// =============================================================================
// Fetch Command
// =============================================================================

async fn run_fetch(config: FetchConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let fetcher = match ReqwestFetcher::with_timeout(config.http_timeout()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut loader = TileImageLoader::new(config.loader_config(), Arc::new(fetcher));

    if !config.no_cache {
        let cache: Arc<dyn ImageCache> = match (&config.cache_db, &config.cache_dir) {
            (Some(db), _) => match SqliteCache::open(db).await {
                Ok(cache) => {
                    info!("  Cache: {}", cache.path().display());
                    Arc::new(cache)
                }
                Err(e) => {
                    error!("Failed to open cache database {}: {}", db.display(), e);
                    return ExitCode::FAILURE;
                }
            },
            (None, Some(dir)) => match FileCache::open(dir).await {
                Ok(cache) => {
                    info!("  Cache: {}", dir.display());
                    Arc::new(cache)
                }
                Err(e) => {
                    error!("Failed to open cache at {}: {}", dir.display(), e);
                    return ExitCode::FAILURE;
                }
            },
            (None, None) => {
                info!("  Cache: memory");
                Arc::new(MemoryCache::new())
            }
        };
        loader = loader.with_cache(cache);
    }

    info!("  Source: {}", config.source.source);
    info!(
        "  View: {:.5}, {:.5} at zoom {} ({}x{} px)",
        config.lat, config.lon, config.zoom, config.width, config.height
    );

    let mut layer = TileLayer::new(config.layer_options(), Arc::new(loader));
    layer.set_source(Some(config.source.tile_source()), Some(config.name.clone()));

    let view = MapView::from_lat_lon(
        config.lat,
        config.lon,
        config.zoom,
        config.width,
        config.height,
    );

    let report = match layer.update(&view) {
        Some(batch) => batch.finished().await,
        None => LoadReport::default(),
    };

    if let Some(matrix) = layer.matrix() {
        info!(
            "  Matrix: zoom {}, x {}..={}, y {}..={}",
            matrix.zoom_level, matrix.x_min, matrix.x_max, matrix.y_min, matrix.y_max
        );
    }

    print_report(&report, config.json);

    if report.failed > 0 {
        warn!("{} of {} tiles failed to load", report.failed, report.requested);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn print_report(report: &LoadReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
        return;
    }

    println!("Requested:  {}", report.requested);
    println!("Loaded:     {}", report.loaded);
    println!("Empty:      {}", report.empty);
    println!("Failed:     {}", report.failed);
    println!("Cache hits: {}", report.cache_hits);
    println!("Downloads:  {}", report.downloads);
}

// =============================================================================
// Clean Command
// =============================================================================

async fn run_clean(config: CleanConfig) -> ExitCode {
    init_logging(config.verbose);

    let (target, result) = match (&config.cache_db, &config.cache_dir) {
        // Opening the database already drops expired entries
        (Some(db), _) => (
            db.display().to_string(),
            SqliteCache::open_cleaned(db).await.map(|(_, removed)| removed),
        ),
        (None, Some(dir)) => (dir.display().to_string(), FileCache::new(dir).clean().await),
        (None, None) => {
            error!("No cache given. Set --cache-dir or --cache-db");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(removed) => {
            println!("Removed {} expired tile(s)", removed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to clean {}: {}", target, e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Uri Command
// =============================================================================

fn run_uri(config: UriConfig) -> ExitCode {
    if let Err(e) = config.source.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match config
        .source
        .tile_source()
        .uri(config.x, config.y, config.z)
    {
        Some(uri) => {
            println!("{}", uri);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Error: no address for tile {}/{}/{}", config.z, config.x, config.y);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_loader=debug"
    } else {
        "tile_loader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
