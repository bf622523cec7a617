//! Deconvolution module
//!
//! Restores blurred channels from a known Gaussian point-spread function
//! using a stabilized Richardson-Lucy iteration.
//!
//! # Features
//!
//! - **PSF** ([`psf`]) - normalized Gaussian kernels
//! - **Filtering** ([`filter`]) - spatial correlation or FFT multiplication
//! - **Backend** ([`backend`]) - one-time selection of the filtering path
//! - **Richardson-Lucy** ([`richardson_lucy`]) - the clamped multiplicative update
//!
//! # Example
//!
//! ```rust
//! use ndarray::Array2;
//! use rl_deblur::{generate_psf, Backend, DeconvOptions, RichardsonLucy};
//!
//! let psf = generate_psf(3, 1.0).unwrap();
//! let observed = Array2::from_elem((16, 16), 0.5f32);
//!
//! let options = DeconvOptions::builder().iterations(5).build();
//! let engine = RichardsonLucy::new(Backend::Spatial, options).unwrap();
//! let restored = engine.deconvolve_channel(observed.view(), &psf).unwrap();
//!
//! assert!(restored.iter().all(|&v| (v - 0.5).abs() < 1e-4));
//! ```

pub mod backend;
pub mod filter;
pub mod psf;
pub mod richardson_lucy;
mod types;

// Re-export public API
pub use backend::{Backend, BackendPreference, FREQUENCY_AVAILABLE};
#[cfg(feature = "fft")]
pub use filter::FrequencyFilter;
pub use filter::{gaussian_blur, FilterStrategy, SpatialFilter};
pub use psf::{generate_psf, Psf, DEFAULT_PSF_SIGMA, DEFAULT_PSF_SIZE};
pub use richardson_lucy::{
    deconvolve_channel, CancelToken, DeconvOptions, DeconvOptionsBuilder, RichardsonLucy,
    Smoothing,
};

pub use types::{DeconvError, Result};
