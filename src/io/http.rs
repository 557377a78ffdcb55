use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Request timeout used by [`ReqwestFetcher::new`]
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with tile requests
pub const USER_AGENT: &str = concat!("tile-loader/", env!("CARGO_PKG_VERSION"));

/// Provider header used to signal that no tile exists at a location
pub const NO_TILE_HEADER: &str = "x-ve-tile-info";

/// Value of [`NO_TILE_HEADER`] meaning "no tile"
pub const NO_TILE_VALUE: &str = "no-tile";

/// Body and caching metadata of a successful tile request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    /// Response body, empty when the provider reported that no tile exists
    pub buffer: Bytes,

    /// `max-age` directive of the `Cache-Control` header
    pub max_age: Option<Duration>,
}

/// Fetches tile bytes over HTTP.
///
/// Implementations must be safe to share between loader workers.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url`, failing on transport errors and non-success statuses.
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError>;
}

// =============================================================================
// Reqwest Fetcher
// =============================================================================

/// [`HttpFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with the default 30 second timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing client, keeping its connection pool and settings.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        // send() resolves once headers are in; the body is read separately
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_max_age);

        if is_no_tile(response.headers()) {
            debug!(url = %url, "Provider reported no tile");
            return Ok(HttpResponse {
                buffer: Bytes::new(),
                max_age,
            });
        }

        let buffer = response
            .bytes()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(HttpResponse { buffer, max_age })
    }
}

// =============================================================================
// Header Helpers
// =============================================================================

/// Extract the `max-age` directive from a `Cache-Control` value.
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;

        if name.trim().eq_ignore_ascii_case("max-age") {
            let seconds = value.trim().trim_matches('"').parse::<u64>().ok()?;
            Some(Duration::from_secs(seconds))
        } else {
            None
        }
    })
}

/// Whether the response headers carry the provider's "no tile" marker.
pub fn is_no_tile(headers: &HeaderMap) -> bool {
    headers
        .get_all(NO_TILE_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(NO_TILE_VALUE))
}
