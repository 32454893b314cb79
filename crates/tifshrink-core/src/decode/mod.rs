//! Image decoding for tifshrink.
//!
//! This module provides functionality for:
//! - Decoding TIFF scans (and any other format the `image` crate supports)
//! - Keeping the source format tag alongside the decoded raster
//!
//! # Examples
//!
//! ```ignore
//! use tifshrink_core::decode::decode_path;
//!
//! let image = decode_path(Path::new("scan.tif")).unwrap();
//! println!("Decoded {}x{} {:?}", image.width(), image.height(), image.pixel_format());
//! ```

mod tiff;
mod types;

pub use tiff::{decode_image, decode_path};
pub use types::{DecodeError, SourceImage};
