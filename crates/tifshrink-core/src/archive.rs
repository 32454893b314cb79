//! Archival TIFF rewriting through an external tool.
//!
//! After the lossy copy is written, the source TIFF is rewritten in place at a
//! higher bit depth with ZIP compression. The rewrite is delegated to
//! ImageMagick, behind the [`ArchiveTool`] trait so callers can substitute
//! another implementation.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigError;

/// Program names tried on `PATH`, in order, when no explicit tool is given.
pub const DEFAULT_TOOL_NAMES: [&str; 2] = ["magick", "convert"];

/// Errors from an archival rewrite.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The tool could not be started
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// The tool ran and reported failure
    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Sample depth of the rewritten archival TIFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveDepth {
    /// 16-bit integer samples.
    #[serde(rename = "16")]
    Bits16,
    /// 32-bit floating point samples.
    #[default]
    #[serde(rename = "32")]
    Bits32,
}

impl ArchiveDepth {
    pub fn bits(self) -> u32 {
        match self {
            ArchiveDepth::Bits16 => 16,
            ArchiveDepth::Bits32 => 32,
        }
    }

    /// 32-bit archives store floating point samples.
    pub fn is_float(self) -> bool {
        matches!(self, ArchiveDepth::Bits32)
    }
}

/// Rewrites a file in place at a given depth with lossless compression.
pub trait ArchiveTool: Send + Sync {
    fn rewrite(&self, path: &Path, depth: ArchiveDepth) -> Result<(), ArchiveError>;
}

/// How to find the ImageMagick executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLocator {
    /// Use exactly this path.
    Explicit(PathBuf),
    /// Take the first of these names found on `PATH`.
    SearchPath(Vec<String>),
}

impl Default for ToolLocator {
    fn default() -> Self {
        ToolLocator::SearchPath(DEFAULT_TOOL_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl ToolLocator {
    /// Resolve to an executable path.
    pub fn resolve(&self) -> Result<PathBuf, ConfigError> {
        match self {
            ToolLocator::Explicit(path) => {
                if is_executable(path) {
                    Ok(path.clone())
                } else {
                    Err(ConfigError::ToolNotFound(path.display().to_string()))
                }
            }
            ToolLocator::SearchPath(names) => {
                let search = env::var_os("PATH").unwrap_or_default();
                names
                    .iter()
                    .find_map(|name| find_in(&search, name))
                    .ok_or_else(|| ConfigError::ToolNotFound(names.join(", ")))
            }
        }
    }
}

/// Regular file with at least one execute bit set.
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Look `name` up in a `PATH`-style list of directories.
fn find_in(search: &std::ffi::OsStr, name: &str) -> Option<PathBuf> {
    env::split_paths(search).find_map(|dir| {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

/// ImageMagick (`magick` or legacy `convert`) as an archive tool.
#[derive(Debug, Clone)]
pub struct MagickTool {
    program: PathBuf,
}

impl MagickTool {
    /// Use the executable at `program` without checking it exists.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find the executable with `locator`.
    pub fn locate(locator: &ToolLocator) -> Result<Self, ConfigError> {
        locator.resolve().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for an in-place rewrite of `path`.
    pub fn args(path: &Path, depth: ArchiveDepth) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            path.into(),
            "-depth".into(),
            depth.bits().to_string().into(),
        ];
        if depth.is_float() {
            args.push("-define".into());
            args.push("quantum:format=floating-point".into());
        }
        args.push("-compress".into());
        args.push("ZIP".into());
        args.push(path.into());
        args
    }
}

impl ArchiveTool for MagickTool {
    fn rewrite(&self, path: &Path, depth: ArchiveDepth) -> Result<(), ArchiveError> {
        let program = self.program.display().to_string();
        debug!(%program, path = %path.display(), bits = depth.bits(), "rewriting archival TIFF");

        let output = Command::new(&self.program)
            .args(Self::args(path, depth))
            .output()
            .map_err(|e| ArchiveError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(ArchiveError::ToolFailed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
