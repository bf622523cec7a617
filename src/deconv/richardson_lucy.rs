//! Stabilized Richardson-Lucy iteration
//!
//! # Algorithm
//!
//! Starting from a lightly smoothed copy of the observed channel, each
//! iteration:
//!
//! 1. Re-blurs the estimate with the PSF and floors it at `eps`
//! 2. Divides the observation by it, clamping the ratio to `[0.5, 2.0]`
//! 3. Filters the ratio with the flipped PSF and smooths the result
//! 4. Clamps that correction to `[clip_low, clip_high]`
//! 5. Multiplies the estimate by the correction
//!
//! The two clamps bound per-iteration amplification, which keeps noisy
//! inputs from blowing up the way plain RL does.

use ndarray::{Array2, ArrayView2, Zip};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::backend::Backend;
use super::filter::{gaussian_blur, FilterStrategy};
use super::psf::Psf;
use super::types::{ensure_kernel_fits, DeconvError, Result};

// ============================================================
// Constants
// ============================================================

/// Default number of iterations
pub const DEFAULT_ITERATIONS: usize = 10;

/// Default division floor
pub const DEFAULT_EPS: f32 = 1e-6;

/// Default lower correction clamp
pub const DEFAULT_CLIP_LOW: f32 = 0.7;

/// Default upper correction clamp
pub const DEFAULT_CLIP_HIGH: f32 = 1.3;

/// Default sigma of the correction smoothing pass
pub const DEFAULT_SMOOTH_SIGMA: f32 = 1.0;

/// Lower ratio clamp
pub const DEFAULT_RATIO_LOW: f32 = 0.5;

/// Upper ratio clamp
pub const DEFAULT_RATIO_HIGH: f32 = 2.0;

/// Sigma of the Gaussian seed smoothing
pub const SEED_SIGMA: f32 = 1.0;

// ============================================================
// Options
// ============================================================

/// How the seed and the correction are smoothed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    /// True Gaussian blur (seed sigma 1.0, correction sigma `smooth_sigma`)
    Gaussian,
    /// One more pass of the PSF itself, in both roles
    Psf,
}

impl Smoothing {
    /// Smoothing used by each backend: the spatial path has a Gaussian
    /// available, the frequency path reuses the PSF.
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::Spatial => Smoothing::Gaussian,
            Backend::Frequency => Smoothing::Psf,
        }
    }
}

/// Options for Richardson-Lucy deconvolution
#[derive(Debug, Clone, PartialEq)]
pub struct DeconvOptions {
    /// Number of iterations (0 returns the seed)
    pub iterations: usize,

    /// Floor applied to the re-blurred estimate before division
    pub eps: f32,

    /// Lower bound of the per-iteration correction
    pub clip_low: f32,

    /// Upper bound of the per-iteration correction
    pub clip_high: f32,

    /// Sigma of the Gaussian correction smoothing
    pub smooth_sigma: f32,

    /// Lower bound of the observed/blurred ratio
    pub ratio_low: f32,

    /// Upper bound of the observed/blurred ratio
    pub ratio_high: f32,

    /// Smoothing strategy; `None` picks the backend's default
    pub smoothing: Option<Smoothing>,
}

impl Default for DeconvOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            eps: DEFAULT_EPS,
            clip_low: DEFAULT_CLIP_LOW,
            clip_high: DEFAULT_CLIP_HIGH,
            smooth_sigma: DEFAULT_SMOOTH_SIGMA,
            ratio_low: DEFAULT_RATIO_LOW,
            ratio_high: DEFAULT_RATIO_HIGH,
            smoothing: None,
        }
    }
}

impl DeconvOptions {
    /// Create a builder
    pub fn builder() -> DeconvOptionsBuilder {
        DeconvOptionsBuilder::default()
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.eps,
            self.clip_low,
            self.clip_high,
            self.smooth_sigma,
            self.ratio_low,
            self.ratio_high,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(DeconvError::InvalidParameter(
                "deconvolution parameters must be finite".to_string(),
            ));
        }
        if self.eps <= 0.0 {
            return Err(DeconvError::InvalidParameter(format!(
                "eps must be positive, got {}",
                self.eps
            )));
        }
        if self.clip_low <= 0.0 || self.clip_low > self.clip_high {
            return Err(DeconvError::InvalidParameter(format!(
                "correction clamp must satisfy 0 < low <= high, got [{}, {}]",
                self.clip_low, self.clip_high
            )));
        }
        if self.ratio_low <= 0.0 || self.ratio_low > self.ratio_high {
            return Err(DeconvError::InvalidParameter(format!(
                "ratio clamp must satisfy 0 < low <= high, got [{}, {}]",
                self.ratio_low, self.ratio_high
            )));
        }
        if self.smooth_sigma <= 0.0 {
            return Err(DeconvError::InvalidParameter(format!(
                "smooth_sigma must be positive, got {}",
                self.smooth_sigma
            )));
        }
        Ok(())
    }
}

/// Builder for DeconvOptions
#[derive(Debug, Default)]
pub struct DeconvOptionsBuilder {
    options: DeconvOptions,
}

impl DeconvOptionsBuilder {
    /// Set iteration count
    #[must_use]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.options.iterations = iterations;
        self
    }

    /// Set division floor
    #[must_use]
    pub fn eps(mut self, eps: f32) -> Self {
        self.options.eps = eps;
        self
    }

    /// Set correction clamp range
    #[must_use]
    pub fn clip(mut self, low: f32, high: f32) -> Self {
        self.options.clip_low = low;
        self.options.clip_high = high;
        self
    }

    /// Set ratio clamp range
    #[must_use]
    pub fn ratio_clip(mut self, low: f32, high: f32) -> Self {
        self.options.ratio_low = low;
        self.options.ratio_high = high;
        self
    }

    /// Set correction smoothing sigma
    #[must_use]
    pub fn smooth_sigma(mut self, sigma: f32) -> Self {
        self.options.smooth_sigma = sigma;
        self
    }

    /// Force a smoothing strategy
    #[must_use]
    pub fn smoothing(mut self, smoothing: Smoothing) -> Self {
        self.options.smoothing = Some(smoothing);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> DeconvOptions {
        self.options
    }
}

// ============================================================
// Cancellation
// ============================================================

/// Shared cancellation flag, checked between iterations
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================
// Engine
// ============================================================

/// Richardson-Lucy engine bound to one backend
pub struct RichardsonLucy {
    backend: Backend,
    strategy: Box<dyn FilterStrategy>,
    smoothing: Smoothing,
    options: DeconvOptions,
}

impl std::fmt::Debug for RichardsonLucy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RichardsonLucy")
            .field("backend", &self.backend)
            .field("smoothing", &self.smoothing)
            .field("options", &self.options)
            .finish()
    }
}

impl RichardsonLucy {
    /// Create an engine, validating the options
    pub fn new(backend: Backend, options: DeconvOptions) -> Result<Self> {
        options.validate()?;
        let smoothing = options
            .smoothing
            .unwrap_or_else(|| Smoothing::for_backend(backend));

        Ok(Self {
            backend,
            strategy: backend.strategy(),
            smoothing,
            options,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    pub fn options(&self) -> &DeconvOptions {
        &self.options
    }

    /// Deconvolve one channel
    pub fn deconvolve_channel(&self, observed: ArrayView2<f32>, psf: &Psf) -> Result<Array2<f32>> {
        self.run(observed, psf, None)
    }

    /// Deconvolve one channel, stopping with `Cancelled` once `cancel` is set
    pub fn deconvolve_channel_with_cancel(
        &self,
        observed: ArrayView2<f32>,
        psf: &Psf,
        cancel: &CancelToken,
    ) -> Result<Array2<f32>> {
        self.run(observed, psf, Some(cancel))
    }

    /// Initial estimate: the observation after one light smoothing pass
    pub fn seed(&self, observed: ArrayView2<f32>, psf: &Psf) -> Result<Array2<f32>> {
        ensure_kernel_fits(psf.kernel().dim(), observed.dim())?;
        self.smooth(observed, psf, SEED_SIGMA)
    }

    fn smooth(&self, grid: ArrayView2<f32>, psf: &Psf, sigma: f32) -> Result<Array2<f32>> {
        match self.smoothing {
            Smoothing::Gaussian => Ok(gaussian_blur(grid, sigma)),
            Smoothing::Psf => self.strategy.filter2d(grid, psf.kernel().view()),
        }
    }

    fn run(
        &self,
        observed: ArrayView2<f32>,
        psf: &Psf,
        cancel: Option<&CancelToken>,
    ) -> Result<Array2<f32>> {
        let opts = &self.options;
        let mut estimate = self.seed(observed, psf)?;
        ensure_finite(&estimate, 0)?;
        let adjoint = psf.flipped();

        tracing::debug!(
            "RL start: {}x{}, psf {}, {} iteration(s), backend {}",
            observed.nrows(),
            observed.ncols(),
            psf.size(),
            opts.iterations,
            self.strategy.name()
        );

        for iteration in 0..opts.iterations {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(DeconvError::Cancelled {
                    completed: iteration,
                });
            }

            let mut blurred = self
                .strategy
                .filter2d(estimate.view(), psf.kernel().view())?;
            blurred.mapv_inplace(|v| v.max(opts.eps));

            let ratio = Zip::from(&observed)
                .and(&blurred)
                .map_collect(|&o, &b| (o / b).clamp(opts.ratio_low, opts.ratio_high));

            let correction = self.strategy.filter2d(ratio.view(), adjoint.view())?;
            let mut correction = self.smooth(correction.view(), psf, opts.smooth_sigma)?;
            correction.mapv_inplace(|v| v.clamp(opts.clip_low, opts.clip_high));

            estimate *= &correction;
            ensure_finite(&estimate, iteration + 1)?;

            tracing::trace!("RL iteration {}/{}", iteration + 1, opts.iterations);
        }

        Ok(estimate)
    }
}

/// Fail with `NumericInstability` if any sample is NaN or infinite.
/// `iteration` 0 refers to the seed.
fn ensure_finite(estimate: &Array2<f32>, iteration: usize) -> Result<()> {
    if estimate.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DeconvError::NumericInstability { iteration })
    }
}

/// Deconvolve one channel with a freshly built engine.
pub fn deconvolve_channel(
    observed: ArrayView2<f32>,
    psf: &Psf,
    options: &DeconvOptions,
    backend: Backend,
) -> Result<Array2<f32>> {
    RichardsonLucy::new(backend, options.clone())?.deconvolve_channel(observed, psf)
}
