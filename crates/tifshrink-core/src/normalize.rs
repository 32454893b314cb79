//! 16-bit to 8-bit normalization for lossy encoding.
//!
//! High bit-depth grayscale scans cannot be written as baseline JPEG. This
//! module stretches the observed sample range of such a raster onto the full
//! 8-bit range so no dynamic range is wasted in the conversion.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

use crate::decode::SourceImage;

/// Convert a 16-bit single channel TIFF raster to 8 bits.
///
/// Only rasters tagged as TIFF with 16-bit single channel samples are
/// converted; everything else is returned unchanged. The result is a new
/// `Luma8` raster with identical dimensions, where each sample is
/// `(sample - min) * 255 / (max - min)` truncated toward zero.
///
/// A constant raster (`max == min`) maps every sample to 0.
pub fn normalize(image: SourceImage) -> SourceImage {
    if !image.is_tiff() {
        return image;
    }

    let rescaled = match image.image() {
        DynamicImage::ImageLuma16(gray) => Some(rescale_to_u8(gray)),
        _ => None,
    };

    match rescaled {
        Some(gray) => SourceImage::new(DynamicImage::ImageLuma8(gray), image.format()),
        None => image,
    }
}

/// Linearly rescale 16-bit samples onto `[0, 255]` using the observed range.
pub fn rescale_to_u8(gray: &ImageBuffer<Luma<u16>, Vec<u16>>) -> GrayImage {
    let (min, max) = sample_range(gray.as_raw());
    let span = u32::from(max - min);

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
        dst.0[0] = scale_sample(src.0[0], min, span);
    }
    out
}

/// Smallest and largest sample, `(0, 0)` for an empty raster.
fn sample_range(samples: &[u16]) -> (u16, u16) {
    let min = samples.iter().copied().min().unwrap_or(0);
    let max = samples.iter().copied().max().unwrap_or(0);
    (min, max)
}

#[inline]
fn scale_sample(sample: u16, min: u16, span: u32) -> u8 {
    if span == 0 {
        return 0;
    }
    // (65535 * 255) fits comfortably in u32
    (u32::from(sample - min) * 255 / span) as u8
}


// ============================================================================
// Property-Based Tests
// ============================================================================
