//! Conversion settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::ArchiveDepth;
use crate::encode::OutputFormat;
use crate::search::{SearchPolicy, SearchPolicyError};

/// One mebibyte, the unit of the size cap on the command line.
pub const MIB: u64 = 1024 * 1024;

/// Errors that stop a run before any image is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No usable archive tool was found
    #[error("ImageMagick is required for TIFF archiving, none found (tried: {0})")]
    ToolNotFound(String),

    /// Explicit quality outside 1-100
    #[error("Quality {0} is out of range (1-100)")]
    InvalidQuality(u8),

    /// Size cap of zero bytes
    #[error("Maximum output size must be greater than zero")]
    InvalidMaxSize,

    /// Search bounds or budget are unusable
    #[error("Invalid quality search settings: {0}")]
    InvalidSearchPolicy(#[from] SearchPolicyError),

    /// The worker pool could not be created
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(String),
}

/// Settings shared by every image in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Fixed quality; when unset the quality is searched per image
    pub quality: Option<u8>,
    /// Size cap for the lossy output in bytes
    pub max_size_bytes: u64,
    /// Lossy output format, already resolved against the build's capabilities
    pub format: OutputFormat,
    /// Sample depth of the archival rewrite
    pub archive_depth: ArchiveDepth,
    /// Worker threads, 0 for one per CPU
    pub jobs: usize,
    /// Quality search bounds and budget
    pub search: SearchPolicy,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: None,
            max_size_bytes: 10 * MIB,
            format: OutputFormat::Jpeg,
            archive_depth: ArchiveDepth::Bits32,
            jobs: 0,
            search: SearchPolicy::default(),
        }
    }
}

impl ConvertOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject settings that cannot produce a valid run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(quality) = self.quality {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::InvalidQuality(quality));
            }
        }
        if self.max_size_bytes == 0 {
            return Err(ConfigError::InvalidMaxSize);
        }
        self.search.validate()?;
        Ok(())
    }
}
