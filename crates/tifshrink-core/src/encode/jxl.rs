//! JPEG-XL encoding through libjxl.
//!
//! Only compiled with the `jxl` feature. libjxl takes a butteraugli distance
//! rather than a 1-100 quality, so the quality scale is mapped onto distance
//! the same way `cjxl -q` does.

use image::DynamicImage;
use jpegxl_rs::encode::EncoderResult;
use jpegxl_rs::encoder_builder;

use super::EncodeError;

/// Encode a decoded raster to JPEG-XL bytes at a 1-100 quality.
pub fn encode_jxl_image(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let rgb = image.to_rgb8();

    let mut encoder = encoder_builder()
        .quality(quality_to_distance(quality))
        .build()
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    let result: EncoderResult<u8> = encoder
        .encode::<u8, u8>(rgb.as_raw(), width, height)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(result.data)
}

/// Map a 1-100 quality onto a butteraugli distance.
pub fn quality_to_distance(quality: u8) -> f32 {
    let q = f32::from(quality.clamp(1, 100));
    if q >= 30.0 {
        0.1 + (100.0 - q) * 0.09
    } else {
        53.0 / 3000.0 * q * q - 23.0 / 20.0 * q + 25.0
    }
}
