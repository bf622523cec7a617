//! rl-deblur - stabilized Richardson-Lucy deconvolution for images
//!
//! Restores blurred photographs from an assumed Gaussian point-spread
//! function. Each color channel is deconvolved independently with a
//! Richardson-Lucy iteration whose ratio and correction are clamped so that
//! noise cannot run away.
//!
//! # Modules
//!
//! - [`deconv`] - PSF, filtering backends and the iteration engine
//! - [`pipeline`] - multi-channel images and the per-channel driver
//! - [`image_io`] - loading and saving image files
//! - [`batch`] - directory processing with per-file failure isolation
//! - [`config`] - TOML config files and CLI overrides
//! - [`progress`] - progress bar and run summary

pub mod batch;
pub mod cli;
pub mod config;
pub mod deconv;
pub mod image_io;
pub mod pipeline;
pub mod progress;

pub use batch::{collect_images, BatchError, BatchProcessor};
pub use cli::{exit_codes, Cli, Commands, RunArgs};
pub use config::{CliOverrides, Config, ConfigError, RunConfig};
pub use deconv::{
    deconvolve_channel, gaussian_blur, generate_psf, Backend, BackendPreference, CancelToken,
    DeconvError, DeconvOptions, DeconvOptionsBuilder, FilterStrategy, Psf, RichardsonLucy,
    Smoothing, SpatialFilter,
};
#[cfg(feature = "fft")]
pub use deconv::FrequencyFilter;
pub use image_io::{load_image_rgb, save_image, ImageIoError};
pub use pipeline::{ChannelPipeline, Image};
pub use progress::{BatchProgress, BatchSummary, NoProgress, OutputMode, ProgressCallback};
