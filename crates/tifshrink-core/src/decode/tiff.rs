//! Source raster decoding.
//!
//! Scans arrive as TIFF, but any container the `image` crate was built with
//! is accepted. The detected format is kept on the result because the
//! bit-depth normalizer keys off it.

use std::io::Cursor;
use std::path::Path;

use image::ImageReader;

use super::{DecodeError, SourceImage};

/// Decode an image from bytes, recording the detected container format.
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` if the bytes are not a recognised image.
/// Returns `DecodeError::CorruptedFile` if the image is corrupted.
pub fn decode_image(bytes: &[u8]) -> Result<SourceImage, DecodeError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let format = reader.format().ok_or(DecodeError::InvalidFormat)?;

    // Archival scans routinely exceed the default allocation limit
    reader.no_limits();

    let img = reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    Ok(SourceImage::new(img, Some(format)))
}

/// Read and decode the image stored at `path`.
pub fn decode_path(path: &Path) -> Result<SourceImage, DecodeError> {
    let bytes = std::fs::read(path).map_err(|e| DecodeError::IoError(e.to_string()))?;
    decode_image(&bytes)
}
