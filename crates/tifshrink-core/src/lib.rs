//! tifshrink core - size-targeted TIFF conversion library
//!
//! This crate turns high bit-depth TIFF scans into lossy copies that fit a
//! byte budget, and hands the source file to an external tool for a lossless
//! archival rewrite.
//!
//! # Module Structure
//!
//! - `decode` - Reading source rasters and their container format
//! - `normalize` - 16-bit to 8-bit rescaling
//! - `encode` - JPEG / JPEG-XL encoding and format capabilities
//! - `search` - Finding the quality that fits a size cap
//! - `archive` - Archival TIFF rewriting through ImageMagick
//! - `pipeline` - Converting a single image
//! - `batch` - Discovering and converting many images in parallel

pub mod archive;
pub mod batch;
pub mod config;
pub mod decode;
pub mod encode;
pub mod normalize;
pub mod pipeline;
pub mod search;

pub use archive::{ArchiveDepth, ArchiveError, ArchiveTool, MagickTool, ToolLocator};
pub use batch::{discover_tiffs, run_batch, BatchReport};
pub use config::{ConfigError, ConvertOptions, MIB};
pub use decode::{DecodeError, SourceImage};
pub use encode::{Capabilities, EncodeError, OutputFormat};
pub use normalize::normalize;
pub use pipeline::{process_image, ImageReport, ProcessError, QualitySource};
pub use search::{
    find_quality, search_quality, SearchOutcome, SearchPolicy, SearchPolicyError,
    StopReason,
};
