use thiserror::Error;

/// Errors that can occur while fetching tile bytes from a source
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// The tile address uses a scheme that cannot be fetched
    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
}

/// Errors raised by image cache backends
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Underlying storage failed
    #[error("Cache I/O error: {0}")]
    Io(String),

    /// Key cannot be mapped onto the backend's storage layout
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Stored entry is unreadable
    #[error("Corrupt cache entry {key}: {message}")]
    Corrupt { key: String, message: String },

    /// Database query or connection failed
    #[error("Cache database error: {0}")]
    Database(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Database(err.to_string())
    }
}

/// Errors that can occur when opening a tile source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Tile database could not be opened or read
    #[error("Tile database error: {0}")]
    Database(String),

    /// Tiles are stored in a format that cannot be shown
    #[error("Unsupported tile format: {0}")]
    UnsupportedFormat(String),
}

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        SourceError::Database(err.to_string())
    }
}

/// Errors that can occur when interpreting tile bytes as an image
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Buffer does not start with a known image signature
    #[error("Unrecognized image format")]
    UnknownFormat,

    /// Header could be identified but not parsed
    #[error("Malformed image: {0}")]
    Malformed(String),
}

/// Errors that can occur while resolving a single tile
///
/// The loader never propagates these past the tile they belong to; they are
/// logged and the tile is left without an image.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// Fetch failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Cache backend failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Image bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}
