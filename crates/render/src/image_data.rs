//! Image decoding.

use crate::error::{RasterError, RasterResult};
use common::Color;
use image::ImageFormat;

/// Decoded image data.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// RGBA pixel data.
    pub data: Vec<u8>,
    /// Original format.
    pub format: ImageFormat,
}

impl ImageData {
    /// Create from raw RGBA data.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            format: ImageFormat::Png,
        }
    }

    /// Decode from bytes; `url` only labels the error.
    pub fn decode(url: &str, bytes: &[u8]) -> RasterResult<Self> {
        let format = image::guess_format(bytes).map_err(|_| RasterError::Decode(url.to_string()))?;
        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|_| RasterError::Decode(url.to_string()))?;
        let rgba = img.to_rgba8();

        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
            format,
        })
    }

    /// Get pixel at position.
    pub fn get_pixel(&self, x: u32, y: u32) -> Color {
        if x >= self.width || y >= self.height {
            return Color::TRANSPARENT;
        }

        let offset = (y as usize * self.width as usize + x as usize) * 4;
        Color::rgba(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        )
    }
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}
