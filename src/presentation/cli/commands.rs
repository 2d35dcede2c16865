//! CLI commands using clap

use crate::application::dto::ExtentMode;
use crate::domain::entities::Category;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// salvage - find and restore deleted files
///
/// Sweeps the free space of a volume (or a whole device or disk image)
/// for known file signatures and restores what it finds.
#[derive(Parser, Debug)]
#[command(name = "salvage")]
#[command(version)]
#[command(about = "Find and restore deleted files by their signatures", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List mounted volumes
    Volumes {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List supported file signatures
    Signatures,

    /// Scan a volume, device or image file for deleted files
    Scan {
        /// Mount point, device (e.g. /dev/sdb1) or image file
        target: String,

        /// Which part of the target to sweep
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Window size in KiB
        #[arg(short, long = "window-kb", value_name = "KIB", value_parser = window_bytes)]
        window: Option<usize>,

        /// Categories to look for (images, documents, videos, audios, other)
        #[arg(short = 't', long, value_delimiter = ',')]
        types: Option<Vec<Category>>,

        /// Memory-map the target (image files)
        #[arg(long)]
        mmap: bool,

        /// Restore every found file into this directory after the scan
        #[arg(short, long, value_name = "DIR")]
        save_to: Option<PathBuf>,

        /// Restore files in parallel
        #[arg(long, requires = "save_to")]
        parallel: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

/// Parses a window size given in KiB into bytes
fn window_bytes(arg: &str) -> Result<usize, String> {
    let kb: usize = arg.parse().map_err(|e| format!("{e}"))?;
    kb.checked_mul(1024)
        .ok_or_else(|| format!("{kb} KiB does not fit in memory"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Auto,
    FreeSpace,
    WholeDevice,
}

impl From<ModeArg> for ExtentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => ExtentMode::Auto,
            ModeArg::FreeSpace => ExtentMode::FreeSpace,
            ModeArg::WholeDevice => ExtentMode::WholeDevice,
        }
    }
}
