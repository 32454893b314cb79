//! tifshrink - batch TIFF to size-capped JPEG / JPEG-XL conversion
//!
//! Every `.tif` under the given path gets a lossy sibling that fits the size
//! cap, and the source file is rewritten as a ZIP-compressed archival TIFF.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tifshrink_core::{
    discover_tiffs, run_batch, ArchiveDepth, ArchiveTool, Capabilities, ConvertOptions,
    MagickTool, OutputFormat, SearchPolicy, ToolLocator, MIB,
};

#[derive(Parser, Debug)]
#[command(
    name = "tifshrink",
    version,
    about = "Prepare TIFF scans: size-capped JPEG/JPEG-XL copies plus ZIP-compressed archival TIFFs."
)]
struct Cli {
    /// TIFF file, or directory searched recursively for TIFF files
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Quality for lossy compression (1-100); deduced per image when omitted
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Maximum size of each lossy output, in MiB
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    max_size: u64,

    /// Use JPEG-XL instead of JPEG (falls back to JPEG when unavailable)
    #[arg(long)]
    jpgxl: bool,

    /// Bit depth of the archival TIFF rewrite
    #[arg(long, value_enum, default_value = "32")]
    depth: Depth,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Path to the ImageMagick executable (default: `magick` or `convert` on PATH)
    #[arg(long, value_name = "PATH")]
    magick: Option<PathBuf>,

    /// Lowest quality the size search may pick
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=100))]
    min_quality: u8,

    /// Leave source TIFFs untouched
    #[arg(long)]
    skip_archive: bool,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Depth {
    #[value(name = "16")]
    B16,
    #[value(name = "32")]
    B32,
}

impl From<Depth> for ArchiveDepth {
    fn from(v: Depth) -> Self {
        match v {
            Depth::B16 => ArchiveDepth::Bits16,
            Depth::B32 => ArchiveDepth::Bits32,
        }
    }
}

impl Cli {
    /// Map arguments onto library options, resolving the output format
    /// against what this build can encode.
    fn options(&self, caps: &Capabilities) -> ConvertOptions {
        let requested = if self.jpgxl {
            OutputFormat::JpegXl
        } else {
            OutputFormat::Jpeg
        };

        ConvertOptions {
            quality: self.quality,
            max_size_bytes: self.max_size.saturating_mul(MIB),
            format: OutputFormat::resolve(requested, caps),
            archive_depth: self.depth.into(),
            jobs: self.jobs,
            search: SearchPolicy {
                min_quality: self.min_quality,
                ..SearchPolicy::default()
            },
        }
    }

    fn tool_locator(&self) -> ToolLocator {
        match &self.magick {
            Some(path) => ToolLocator::Explicit(path.clone()),
            None => ToolLocator::default(),
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Returns whether every image converted.
fn run(cli: &Cli) -> Result<bool> {
    if !cli.path.exists() {
        bail!("{} does not exist", cli.path.display());
    }

    let options = cli.options(&Capabilities::detect());
    options.validate().context("invalid options")?;

    // Fail before touching any image when the archive tool is missing
    let tool = if cli.skip_archive {
        None
    } else {
        let tool = MagickTool::locate(&cli.tool_locator())?;
        info!("Using {} for TIFF archiving", tool.program().display());
        Some(tool)
    };

    let files = discover_tiffs(&cli.path);
    if files.is_empty() {
        warn!("No TIFF files found in {}", cli.path.display());
        return Ok(true);
    }
    info!(
        "Converting {} file(s) to {}, max {} byte(s) each",
        files.len(),
        options.format,
        options.max_size_bytes
    );

    let report = run_batch(
        &files,
        &options,
        tool.as_ref().map(|t| t as &dyn ArchiveTool),
    )
    .context("batch setup failed")?;

    info!(
        "Converted {}/{} image(s)",
        report.succeeded.len(),
        report.total()
    );
    for failure in &report.failed {
        error!("Failed: {}", failure.path().display());
    }

    Ok(report.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
