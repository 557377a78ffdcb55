//! Tile payload decoding.
//!
//! Tile buffers stay encoded all the way to the display layer. Decoding here
//! means validating the buffer: the format is sniffed from the signature and
//! the pixel size is read from the header, which rejects truncated or foreign
//! payloads (HTML error pages, empty bodies) before they reach a tile.

use std::io::Cursor;

use bytes::Bytes;
use image::ImageReader;

use crate::error::DecodeError;

use super::model::TileImage;

/// Turns fetched bytes into a [`TileImage`].
pub trait TileDecoder: Send + Sync {
    fn decode(&self, buffer: Bytes) -> Result<TileImage, DecodeError>;
}

/// Decoder backed by the `image` crate's format detection.
#[derive(Debug, Clone, Default)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TileDecoder for ImageDecoder {
    fn decode(&self, buffer: Bytes) -> Result<TileImage, DecodeError> {
        let format = image::guess_format(&buffer).map_err(|_| DecodeError::UnknownFormat)?;

        let reader = ImageReader::with_format(Cursor::new(&buffer[..]), format);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        Ok(TileImage {
            data: buffer,
            format,
            width,
            height,
        })
    }
}
