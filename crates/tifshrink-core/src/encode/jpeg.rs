//! JPEG encoding.
//!
//! This module provides JPEG encoding using the `image` crate's JPEG encoder.
//! Grayscale and RGB buffers are written as-is; every other layout is
//! converted first, since baseline JPEG only carries 8-bit samples.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use std::io::Cursor;

use super::EncodeError;

/// Sample layout of a raw 8-bit pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One byte per pixel.
    Gray,
    /// Three bytes per pixel, R G B.
    Rgb,
}

impl PixelLayout {
    /// Bytes used by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Gray => 1,
            PixelLayout::Rgb => 3,
        }
    }

    fn color_type(self) -> ExtendedColorType {
        match self {
            PixelLayout::Gray => ExtendedColorType::L8,
            PixelLayout::Rgb => ExtendedColorType::Rgb8,
        }
    }
}

/// Encode 8-bit pixel data to JPEG bytes.
///
/// # Arguments
///
/// * `pixels` - Pixel data in row-major order, laid out as `layout`
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `layout` - Gray (1 byte per pixel) or RGB (3 bytes per pixel)
/// * `quality` - JPEG quality (1-100, where 100 is highest quality)
///
/// # Returns
///
/// JPEG-encoded bytes on success, or an error if encoding fails.
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    // Validate dimensions
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    // Validate pixel data length
    let expected_len = (width as usize) * (height as usize) * layout.bytes_per_pixel();
    if pixels.len() != expected_len {
        return Err(EncodeError::InvalidPixelData {
            expected: expected_len,
            actual: pixels.len(),
        });
    }

    // Clamp quality to valid range (1-100)
    let quality = quality.clamp(1, 100);

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);

    encoder
        .write_image(pixels, width, height, layout.color_type())
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Encode a decoded raster to JPEG bytes.
///
/// `Luma8` and `Rgb8` rasters are passed straight through. Other luma
/// layouts are reduced to `Luma8`, everything else to `Rgb8`.
pub fn encode_jpeg_image(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    match image {
        DynamicImage::ImageLuma8(gray) => encode_jpeg(
            gray.as_raw(),
            gray.width(),
            gray.height(),
            PixelLayout::Gray,
            quality,
        ),
        DynamicImage::ImageRgb8(rgb) => encode_jpeg(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            PixelLayout::Rgb,
            quality,
        ),
        other if !other.color().has_color() => {
            let gray = other.to_luma8();
            encode_jpeg(gray.as_raw(), gray.width(), gray.height(), PixelLayout::Gray, quality)
        }
        other => {
            let rgb = other.to_rgb8();
            encode_jpeg(rgb.as_raw(), rgb.width(), rgb.height(), PixelLayout::Rgb, quality)
        }
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
