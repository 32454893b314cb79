//! Per-image conversion pipeline.
//!
//! decode → normalize → resolve quality → write lossy copy → archival rewrite

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{ArchiveDepth, ArchiveError, ArchiveTool};
use crate::config::ConvertOptions;
use crate::decode::{decode_path, DecodeError};
use crate::encode::{encode_image, output_path, EncodeError};
use crate::normalize::normalize;
use crate::search::{find_quality, StopReason};

/// Failure of a single image, tagged with its source path.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{}: decode failed: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("{}: encode failed: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    #[error("{}: cannot write {}: {source}", path.display(), output.display())]
    Write {
        path: PathBuf,
        output: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: archival rewrite failed: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("{}: output {} is also claimed by {}", path.display(), output.display(), claimed_by.display())]
    OutputCollision {
        path: PathBuf,
        output: PathBuf,
        claimed_by: PathBuf,
    },

    #[error("{}: conversion panicked: {message}", path.display())]
    Panicked { path: PathBuf, message: String },
}

impl ProcessError {
    /// Source image the failure belongs to.
    pub fn path(&self) -> &Path {
        match self {
            ProcessError::Decode { path, .. }
            | ProcessError::Encode { path, .. }
            | ProcessError::Write { path, .. }
            | ProcessError::Archive { path, .. }
            | ProcessError::OutputCollision { path, .. }
            | ProcessError::Panicked { path, .. } => path,
        }
    }
}

/// Where the output quality came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySource {
    /// Fixed by the caller.
    Explicit,
    /// Found by the size search after `trials` encodes.
    Searched { stop: StopReason, trials: usize },
}

/// Result of converting one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub quality: u8,
    pub quality_source: QualitySource,
    /// Size of the written lossy file in bytes.
    pub output_bytes: u64,
    /// Depth of the archival rewrite, `None` when archiving was skipped.
    pub archived: Option<ArchiveDepth>,
}

/// Convert one source image.
///
/// Pass `archive: None` to leave the source file untouched.
pub fn process_image(
    path: &Path,
    options: &ConvertOptions,
    archive: Option<&dyn ArchiveTool>,
) -> Result<ImageReport, ProcessError> {
    info!(
        "Processing {}",
        path.file_name().unwrap_or(path.as_os_str()).to_string_lossy()
    );

    let source = decode_path(path).map_err(|source| ProcessError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        width = source.width(),
        height = source.height(),
        pixel_format = ?source.pixel_format(),
        "decoded"
    );

    let image = normalize(source).into_image();
    let encode_err = |source| ProcessError::Encode {
        path: path.to_path_buf(),
        source,
    };

    let (quality, quality_source) = match options.quality {
        Some(quality) => (quality, QualitySource::Explicit),
        None => {
            let outcome = find_quality(
                &image,
                options.format,
                options.max_size_bytes,
                &options.search,
            )
            .map_err(encode_err)?;
            let searched = QualitySource::Searched {
                stop: outcome.stop,
                trials: outcome.trials.len(),
            };
            (outcome.quality, searched)
        }
    };

    let bytes = encode_image(&image, options.format, quality).map_err(encode_err)?;
    let output = output_path(path, options.format);
    std::fs::write(&output, &bytes).map_err(|source| ProcessError::Write {
        path: path.to_path_buf(),
        output: output.clone(),
        source,
    })?;

    let archived = match archive {
        Some(tool) => {
            tool.rewrite(path, options.archive_depth)
                .map_err(|source| ProcessError::Archive {
                    path: path.to_path_buf(),
                    source,
                })?;
            Some(options.archive_depth)
        }
        None => None,
    };

    info!(
        output = %output.display(),
        quality,
        bytes = bytes.len(),
        "wrote {}",
        options.format
    );

    Ok(ImageReport {
        source: path.to_path_buf(),
        output,
        quality,
        quality_source,
        output_bytes: bytes.len() as u64,
        archived,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::OutputFormat;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
    use std::sync::Mutex;

    /// Archive tool that records calls instead of running anything.
    #[derive(Default)]
    struct RecordingTool {
        calls: Mutex<Vec<(PathBuf, ArchiveDepth)>>,
    }

    impl ArchiveTool for RecordingTool {
        fn rewrite(&self, path: &Path, depth: ArchiveDepth) -> Result<(), ArchiveError> {
            self.calls.lock().unwrap().push((path.to_path_buf(), depth));
            Ok(())
        }
    }

    struct FailingTool;

    impl ArchiveTool for FailingTool {
        fn rewrite(&self, _path: &Path, _depth: ArchiveDepth) -> Result<(), ArchiveError> {
            Err(ArchiveError::ToolFailed {
                program: "magick".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "no decode delegate".to_string(),
            })
        }
    }

    fn write_tiff16(path: &Path) {
        let gray = ImageBuffer::from_fn(64, 48, |x, y| Luma([(1000 + x * 50 + y * 20) as u16]));
        DynamicImage::ImageLuma16(gray)
            .save_with_format(path, ImageFormat::Tiff)
            .unwrap();
    }

    #[test]
    fn test_explicit_quality_skips_search() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("page.tif");
        write_tiff16(&tif);

        let mut options = ConvertOptions::new();
        options.quality = Some(42);
        let tool = RecordingTool::default();

        let report = process_image(&tif, &options, Some(&tool)).unwrap();
        assert_eq!(report.quality, 42);
        assert_eq!(report.quality_source, QualitySource::Explicit);
        assert_eq!(report.output, dir.path().join("page.jpg"));
        assert!(report.output.is_file());
        assert_eq!(std::fs::metadata(&report.output).unwrap().len(), report.output_bytes);
    }

    #[test]
    fn test_searched_quality_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("page.tif");
        write_tiff16(&tif);

        let mut options = ConvertOptions::new();
        options.max_size_bytes = 1500;
        let tool = RecordingTool::default();

        let report = process_image(&tif, &options, Some(&tool)).unwrap();
        assert!(matches!(report.quality_source, QualitySource::Searched { .. }));
        assert!((1..=100).contains(&report.quality));

        let at_min = encode_image(
            &normalize(decode_path(&tif).unwrap()).into_image(),
            OutputFormat::Jpeg,
            1,
        )
        .unwrap()
        .len() as u64;
        if at_min <= options.max_size_bytes {
            assert!(report.output_bytes <= options.max_size_bytes);
        }
    }

    #[test]
    fn test_archive_tool_receives_source_and_depth() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("page.tif");
        write_tiff16(&tif);

        let mut options = ConvertOptions::new();
        options.archive_depth = ArchiveDepth::Bits16;
        let tool = RecordingTool::default();

        let report = process_image(&tif, &options, Some(&tool)).unwrap();
        assert_eq!(report.archived, Some(ArchiveDepth::Bits16));
        assert_eq!(
            *tool.calls.lock().unwrap(),
            vec![(tif.clone(), ArchiveDepth::Bits16)]
        );
    }

    #[test]
    fn test_skip_archive() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("page.tif");
        write_tiff16(&tif);

        let report = process_image(&tif, &ConvertOptions::new(), None).unwrap();
        assert_eq!(report.archived, None);
    }

    #[test]
    fn test_corrupt_input_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("broken.tif");
        std::fs::write(&tif, b"II*\0garbage").unwrap();

        let err = process_image(&tif, &ConvertOptions::new(), None).unwrap_err();
        assert!(matches!(err, ProcessError::Decode { .. }));
        assert_eq!(err.path(), tif.as_path());
        assert!(err.to_string().contains("broken.tif"));
    }

    #[test]
    fn test_archive_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("page.tif");
        write_tiff16(&tif);

        let err = process_image(&tif, &ConvertOptions::new(), Some(&FailingTool)).unwrap_err();
        assert!(matches!(err, ProcessError::Archive { .. }));
        assert_eq!(err.path(), tif.as_path());
        // The lossy copy is written before archiving starts
        assert!(dir.path().join("page.jpg").is_file());
    }
}
