//! Batch discovery and parallel conversion.
//!
//! Each image is an independent task on a fixed-size worker pool. Tasks share
//! nothing mutable and finish in any order. A failing or panicking task is
//! recorded in the [`BatchReport`] and never stops its siblings.
//!
//! `scan.tif` and `scan.tiff` map to the same lossy output. The first one in
//! input order owns it; the others fail with
//! [`ProcessError::OutputCollision`] and are not converted.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info_span, warn};
use walkdir::WalkDir;

use crate::archive::ArchiveTool;
use crate::config::{ConfigError, ConvertOptions};
use crate::encode::{output_path, OutputFormat};
use crate::pipeline::{process_image, ImageReport, ProcessError};

/// Outcome of a whole batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ImageReport>,
    pub failed: Vec<ProcessError>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Check whether `path` carries a TIFF extension (case-insensitive).
pub fn is_tiff_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Collect TIFF files under `root`, sorted by path.
///
/// A file root is returned as-is when it has a TIFF extension. Unreadable
/// directory entries are skipped.
pub fn discover_tiffs(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_tiff_path(p))
        .collect();
    files.sort();
    files
}

/// Split `files` into those that own their output path and failures for
/// those whose output an earlier file already owns.
fn claim_outputs(files: &[PathBuf], format: OutputFormat) -> (Vec<&Path>, Vec<ProcessError>) {
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
    let mut claimed = Vec::with_capacity(files.len());
    let mut collisions = Vec::new();

    for path in files {
        match owners.entry(output_path(path, format)) {
            Entry::Occupied(owner) => collisions.push(ProcessError::OutputCollision {
                path: path.clone(),
                output: owner.key().clone(),
                claimed_by: owner.get().to_path_buf(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(path);
                claimed.push(path.as_path());
            }
        }
    }
    (claimed, collisions)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Run one conversion, turning a panic into a [`ProcessError::Panicked`].
fn convert_isolated(
    path: &Path,
    options: &ConvertOptions,
    archive: Option<&dyn ArchiveTool>,
) -> Result<ImageReport, ProcessError> {
    panic::catch_unwind(AssertUnwindSafe(|| process_image(path, options, archive))).unwrap_or_else(
        |payload| {
            Err(ProcessError::Panicked {
                path: path.to_path_buf(),
                message: panic_message(payload.as_ref()),
            })
        },
    )
}

/// Convert every file in `files` on a pool of `options.jobs` workers.
///
/// Only pool construction can fail; per-image failures, panics included, are
/// collected in the returned report.
pub fn run_batch(
    files: &[PathBuf],
    options: &ConvertOptions,
    archive: Option<&dyn ArchiveTool>,
) -> Result<BatchReport, ConfigError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .map_err(|e| ConfigError::ThreadPool(e.to_string()))?;

    let (claimed, collisions) = claim_outputs(files, options.format);

    let results: Vec<Result<ImageReport, ProcessError>> = pool.install(|| {
        claimed
            .par_iter()
            .map(|path| {
                let _span = info_span!("image", path = %path.display()).entered();
                convert_isolated(path, options, archive)
            })
            .collect()
    });

    let mut report = BatchReport::default();
    for result in results.into_iter().chain(collisions.into_iter().map(Err)) {
        match result {
            Ok(image) => report.succeeded.push(image),
            Err(err) => {
                warn!("{err}");
                report.failed.push(err);
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveDepth, ArchiveError};
    use crate::config::MIB;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
    use std::sync::Mutex;

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

    fn write_tiff16(path: &Path, seed: u32) {
        let gray = ImageBuffer::from_fn(80, 60, |x, y| {
            Luma([(500 + (x * 97 + y * 31 + seed * 13) % 3000) as u16])
        });
        DynamicImage::ImageLuma16(gray)
            .save_with_format(path, ImageFormat::Tiff)
            .unwrap();
    }

    #[test]
    fn test_is_tiff_path() {
        assert!(is_tiff_path(Path::new("a/b.tif")));
        assert!(is_tiff_path(Path::new("a/b.TIFF")));
        assert!(!is_tiff_path(Path::new("a/b.jpg")));
        assert!(!is_tiff_path(Path::new("a/tif")));
    }

    #[test]
    fn test_discover_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("box2");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.tif"), b"").unwrap();
        std::fs::write(dir.path().join("a.tiff"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(nested.join("c.TIF"), b"").unwrap();

        let files = discover_tiffs(dir.path());
        assert_eq!(
            files,
            vec![
                dir.path().join("a.tiff"),
                dir.path().join("b.tif"),
                nested.join("c.TIF"),
            ]
        );
    }

    #[test]
    fn test_discover_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("one.tif");
        std::fs::write(&tif, b"").unwrap();

        assert_eq!(discover_tiffs(&tif), vec![tif]);
    }

    #[test]
    fn test_three_images_under_one_mib() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            write_tiff16(&dir.path().join(format!("scan{i}.tif")), i);
        }

        let mut options = ConvertOptions::new();
        options.max_size_bytes = MIB;
        options.jobs = 2;
        let tool = RecordingTool::default();

        let files = discover_tiffs(dir.path());
        let report = run_batch(&files, &options, Some(&tool)).unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 3);
        for image in &report.succeeded {
            assert_eq!(image.output.extension().unwrap(), "jpg");
            let size = std::fs::metadata(&image.output).unwrap().len();
            assert!(size <= MIB);
        }

        let mut archived: Vec<PathBuf> = tool
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(path, depth)| {
                assert_eq!(*depth, ArchiveDepth::Bits32);
                path.clone()
            })
            .collect();
        archived.sort();
        assert_eq!(archived, files);
    }

    #[test]
    fn test_corrupt_image_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            write_tiff16(&dir.path().join(format!("good{i}.tif")), i);
        }
        let broken = dir.path().join("broken.tif");
        std::fs::write(&broken, b"not a tiff at all").unwrap();

        let files = discover_tiffs(dir.path());
        assert_eq!(files.len(), 5);

        let report = run_batch(&files, &ConvertOptions::new(), None).unwrap();

        assert_eq!(report.total(), 5);
        assert_eq!(report.succeeded.len(), 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path(), broken.as_path());
        assert!(!report.is_success());
    }

    /// Archive tool that panics for one file name.
    struct PanickingTool(&'static str);

    impl ArchiveTool for PanickingTool {
        fn rewrite(&self, path: &Path, _depth: ArchiveDepth) -> Result<(), ArchiveError> {
            if path.file_name().is_some_and(|n| n == self.0) {
                panic!("archive tool crashed on {}", self.0);
            }
            Ok(())
        }
    }

    #[test]
    fn test_panicking_task_does_not_discard_siblings() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write_tiff16(&dir.path().join(format!("s{i}.tif")), i);
        }

        let files = discover_tiffs(dir.path());
        let mut options = ConvertOptions::new();
        options.quality = Some(70);
        options.jobs = 2;
        let tool = PanickingTool("s2.tif");

        let report = run_batch(&files, &options, Some(&tool)).unwrap();

        assert_eq!(report.succeeded.len(), 4);
        assert_eq!(report.failed.len(), 1);
        match &report.failed[0] {
            ProcessError::Panicked { path, message } => {
                assert_eq!(path, &dir.path().join("s2.tif"));
                assert!(message.contains("archive tool crashed on s2.tif"));
            }
            other => panic!("expected Panicked, got {other:?}"),
        }
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "unknown panic payload");
    }

    #[test]
    fn test_tif_and_tiff_siblings_do_not_share_output() {
        let dir = tempfile::tempdir().unwrap();
        write_tiff16(&dir.path().join("a.tif"), 0);
        write_tiff16(&dir.path().join("a.tiff"), 1);
        write_tiff16(&dir.path().join("b.tif"), 2);

        let files = discover_tiffs(dir.path());
        let mut options = ConvertOptions::new();
        options.quality = Some(70);

        let report = run_batch(&files, &options, None).unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        match &report.failed[0] {
            ProcessError::OutputCollision {
                path,
                output,
                claimed_by,
            } => {
                assert_eq!(path, &dir.path().join("a.tiff"));
                assert_eq!(output, &dir.path().join("a.jpg"));
                assert_eq!(claimed_by, &dir.path().join("a.tif"));
            }
            other => panic!("expected OutputCollision, got {other:?}"),
        }

        let owner = report
            .succeeded
            .iter()
            .find(|r| r.source == dir.path().join("a.tif"))
            .unwrap();
        assert_eq!(
            std::fs::metadata(&owner.output).unwrap().len(),
            owner.output_bytes
        );
    }

    #[test]
    fn test_claim_outputs_keeps_first_owner() {
        let files = vec![
            PathBuf::from("x/a.tif"),
            PathBuf::from("x/a.tiff"),
            PathBuf::from("y/a.tif"),
        ];
        let (claimed, collisions) = claim_outputs(&files, OutputFormat::Jpeg);

        assert_eq!(claimed, vec![Path::new("x/a.tif"), Path::new("y/a.tif")]);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].path(), Path::new("x/a.tiff"));
    }

    #[test]
    fn test_empty_batch() {
        let report = run_batch(&[], &ConvertOptions::new(), None).unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.is_success());
    }
}
