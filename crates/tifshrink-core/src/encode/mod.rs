//! Lossy encoding for tifshrink.
//!
//! This module provides functionality for:
//! - Encoding rasters to JPEG with a 1-100 quality
//! - Encoding rasters to JPEG-XL when built with the `jxl` feature
//! - Deciding once, at startup, which output formats are available
//!
//! # Examples
//!
//! ```ignore
//! use tifshrink_core::encode::{encode_image, Capabilities, OutputFormat};
//!
//! let format = OutputFormat::resolve(OutputFormat::JpegXl, &Capabilities::detect());
//! let bytes = encode_image(image.image(), format, 85).unwrap();
//! println!("Encoded {} bytes", bytes.len());
//! ```

mod jpeg;
#[cfg(feature = "jxl")]
mod jxl;

use std::fmt;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub use jpeg::{encode_jpeg, encode_jpeg_image, PixelLayout};
#[cfg(feature = "jxl")]
pub use jxl::{encode_jxl_image, quality_to_distance};

/// Errors that can occur during encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// The requested format was not compiled into this build
    #[error("{0} encoding is not available in this build")]
    Unsupported(OutputFormat),

    /// The underlying encoder failed
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}

/// Lossy output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    JpegXl,
}

impl OutputFormat {
    /// File extension used for outputs of this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::JpegXl => "jxl",
        }
    }

    /// Pick the format to actually use, falling back to JPEG when the
    /// requested one is unavailable.
    pub fn resolve(requested: OutputFormat, caps: &Capabilities) -> OutputFormat {
        if caps.supports(requested) {
            requested
        } else {
            warn!("{requested} is not supported, falling back to {}", OutputFormat::Jpeg);
            OutputFormat::Jpeg
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("JPEG"),
            OutputFormat::JpegXl => f.write_str("JPEG-XL"),
        }
    }
}

/// Encoders available to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub jpeg_xl: bool,
}

impl Capabilities {
    /// Capabilities of the current build.
    pub fn detect() -> Self {
        Self {
            jpeg_xl: cfg!(feature = "jxl"),
        }
    }

    /// Check whether `format` can be encoded.
    pub fn supports(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Jpeg => true,
            OutputFormat::JpegXl => self.jpeg_xl,
        }
    }
}

/// Encode `image` as `format` at `quality` (clamped to 1-100) into memory.
pub fn encode_image(
    image: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    match format {
        OutputFormat::Jpeg => encode_jpeg_image(image, quality),
        #[cfg(feature = "jxl")]
        OutputFormat::JpegXl => encode_jxl_image(image, quality),
        #[cfg(not(feature = "jxl"))]
        OutputFormat::JpegXl => Err(EncodeError::Unsupported(format)),
    }
}

/// Sibling path of `source` carrying the extension for `format`.
pub fn output_path(source: &Path, format: OutputFormat) -> PathBuf {
    source.with_extension(format.extension())
}
