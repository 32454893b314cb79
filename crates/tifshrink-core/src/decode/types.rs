//! Core types for image decoding.

use image::{ColorType, DynamicImage, ImageFormat};
use thiserror::Error;

/// Error types for image decoding operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file format is not recognized or supported.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),

    /// I/O error during file reading.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// A decoded raster together with the container format it came from.
///
/// The buffer is never mutated once decoded. Operations such as
/// [`crate::normalize::normalize`] produce a new `SourceImage` instead.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
    format: Option<ImageFormat>,
}

impl SourceImage {
    /// Wrap a decoded image and the format tag it was read with.
    pub fn new(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self { image, format }
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel layout (bit depth and channel count).
    pub fn pixel_format(&self) -> ColorType {
        self.image.color()
    }

    /// Container format the raster was decoded from, if known.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// Check whether the raster came out of a TIFF container.
    pub fn is_tiff(&self) -> bool {
        self.format == Some(ImageFormat::Tiff)
    }

    /// Check whether this is 16-bit single channel data.
    pub fn is_luma16(&self) -> bool {
        self.pixel_format() == ColorType::L16
    }

    /// Borrow the underlying raster.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Take the underlying raster.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// Check if this is an empty/invalid image.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}
