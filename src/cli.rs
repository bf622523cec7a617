//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::deconv::BackendPreference;

/// Exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGS: i32 = 2;
    pub const INPUT_NOT_FOUND: i32 = 3;
}

/// Stabilized Richardson-Lucy deconvolution (color, FFT backend optional)
#[derive(Debug, Parser)]
#[command(name = "rl-deblur", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Restore every image in a directory
    Run(RunArgs),
    /// Show build and system information
    Info,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Input directory containing images
    #[arg(long = "input-dir", alias = "input_dir")]
    pub input_dir: PathBuf,

    /// Output directory to save processed images
    #[arg(long = "output-dir", alias = "output_dir")]
    pub output_dir: PathBuf,

    /// Number of RL iterations [default: 10]
    #[arg(long, allow_negative_numbers = true)]
    pub iterations: Option<i64>,

    /// PSF kernel size, odd [default: 7]
    #[arg(long = "psf-size", alias = "psf_size")]
    pub psf_size: Option<usize>,

    /// PSF Gaussian sigma [default: 2.0]
    #[arg(long = "psf-sigma", alias = "psf_sigma")]
    pub psf_sigma: Option<f32>,

    /// Use the FFT backend (yes), or the spatial one (no, auto) [default: auto]
    #[arg(long, value_enum)]
    pub gpu: Option<BackendPreference>,

    /// Images processed concurrently (0 = one per CPU) [default: 1]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Deconvolve color channels concurrently
    #[arg(long)]
    pub parallel_channels: bool,

    /// Config file (defaults to ./rl-deblur.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the resolved settings and file list without processing
    #[arg(long)]
    pub dry_run: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl RunArgs {
    /// Values explicitly set on the command line
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            iterations: self.iterations,
            psf_size: self.psf_size,
            psf_sigma: self.psf_sigma,
            gpu: self.gpu,
            threads: self.threads,
            parallel_channels: self.parallel_channels.then_some(true),
        }
    }
}
