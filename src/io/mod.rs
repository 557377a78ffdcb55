//! Network I/O for tile payloads.

mod http;

pub use http::{
    is_no_tile, parse_max_age, HttpFetcher, HttpResponse, ReqwestFetcher, DEFAULT_HTTP_TIMEOUT,
    NO_TILE_HEADER, NO_TILE_VALUE, USER_AGENT,
};
