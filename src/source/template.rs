use std::path::Path;

use url::Url;

use super::{is_http, TileSource};

/// Subdomains used when a template contains `{s}` but none were given
pub const DEFAULT_SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// Tile source filling a URL template.
///
/// Placeholders: `{x}` column, `{y}` row, `{z}` zoom level and `{s}`
/// subdomain, picked as `subdomains[(x + y) % n]`. `{c}` is accepted as an
/// older spelling of `{s}`.
///
/// ```
/// use tile_loader::source::{TileSource, UrlTileSource};
///
/// let source = UrlTileSource::new("https://{s}.tile.example/{z}/{x}/{y}.png");
/// let uri = source.uri(1, 2, 3).unwrap();
/// assert_eq!(uri.as_str(), "https://a.tile.example/3/1/2.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTileSource {
    template: String,
    subdomains: Vec<String>,
}

impl UrlTileSource {
    /// Create a source, defaulting the subdomains to `a`, `b`, `c` when the
    /// template uses `{s}`.
    pub fn new(template: impl Into<String>) -> Self {
        let template = normalize(template.into());

        let subdomains = if template.contains("{s}") {
            DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };

        Self {
            template,
            subdomains,
        }
    }

    /// Create a source with an explicit subdomain list.
    pub fn with_subdomains<I, S>(template: impl Into<String>, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            template: normalize(template.into()),
            subdomains: subdomains.into_iter().map(Into::into).collect(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    /// Fill the template for one tile.
    pub fn format(&self, x: i32, y: i32, zoom_level: u32) -> String {
        let mut address = self
            .template
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{z}", &zoom_level.to_string());

        if !self.subdomains.is_empty() {
            let index = (x as i64 + y as i64).rem_euclid(self.subdomains.len() as i64) as usize;
            address = address.replace("{s}", &self.subdomains[index]);
        }

        address
    }
}

impl TileSource for UrlTileSource {
    fn uri(&self, x: i32, y: i32, zoom_level: u32) -> Option<Url> {
        parse_address(&self.format(x, y, zoom_level))
    }

    fn is_cacheable(&self) -> bool {
        is_http(&self.template)
    }
}

fn normalize(template: String) -> String {
    template.replace("{c}", "{s}")
}

/// Parse an absolute URL, or an absolute filesystem path as a `file` URL.
pub(crate) fn parse_address(address: &str) -> Option<Url> {
    match Url::parse(address) {
        // Single letter schemes are Windows drive letters
        Ok(url) if url.scheme().len() > 1 => Some(url),
        _ => {
            let path = Path::new(address);
            if path.is_absolute() {
                Url::from_file_path(path).ok()
            } else {
                None
            }
        }
    }
}
