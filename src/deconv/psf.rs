//! Point-spread function construction
//!
//! The PSF is a small square kernel with an odd side length whose weights
//! sum to 1. Only separable Gaussian PSFs are generated here; arbitrary
//! kernels can be wrapped with [`Psf::from_array`].

use ndarray::{s, Array1, Array2};

use super::types::{DeconvError, Result};

// ============================================================
// Constants
// ============================================================

/// Default PSF side length
pub const DEFAULT_PSF_SIZE: usize = 7;

/// Default PSF Gaussian sigma
pub const DEFAULT_PSF_SIGMA: f32 = 2.0;

// ============================================================
// Types
// ============================================================

/// Normalized point-spread function
#[derive(Debug, Clone, PartialEq)]
pub struct Psf {
    kernel: Array2<f32>,
}

impl Psf {
    /// Wrap a caller-supplied kernel.
    ///
    /// The kernel must be square with an odd side, non-negative and finite,
    /// with a positive sum. It is rescaled to sum to 1.
    pub fn from_array(kernel: Array2<f32>) -> Result<Self> {
        let (rows, cols) = kernel.dim();
        if rows != cols || rows % 2 == 0 {
            return Err(DeconvError::InvalidParameter(format!(
                "PSF must be square with an odd side, got {}x{}",
                rows, cols
            )));
        }
        if kernel.iter().any(|&w| !w.is_finite() || w < 0.0) {
            return Err(DeconvError::InvalidParameter(
                "PSF weights must be finite and non-negative".to_string(),
            ));
        }

        let sum = kernel.sum();
        if sum <= 0.0 {
            return Err(DeconvError::InvalidParameter(
                "PSF weights must have a positive sum".to_string(),
            ));
        }

        Ok(Self {
            kernel: kernel / sum,
        })
    }

    /// The 1x1 unit kernel
    pub fn identity() -> Self {
        Self {
            kernel: Array2::ones((1, 1)),
        }
    }

    /// Side length
    pub fn size(&self) -> usize {
        self.kernel.nrows()
    }

    /// Kernel weights
    pub fn kernel(&self) -> &Array2<f32> {
        &self.kernel
    }

    /// Kernel reversed along both axes (the adjoint used by the correction step)
    pub fn flipped(&self) -> Array2<f32> {
        self.kernel.slice(s![..;-1, ..;-1]).to_owned()
    }
}

// ============================================================
// Generation
// ============================================================

/// Build a normalized 2D Gaussian PSF.
///
/// `size` must be odd and at least 1; even sizes are rejected rather than
/// rounded. `sigma` must be finite and positive.
pub fn generate_psf(size: usize, sigma: f32) -> Result<Psf> {
    if size == 0 || size % 2 == 0 {
        return Err(DeconvError::InvalidParameter(format!(
            "PSF size must be a positive odd integer, got {}",
            size
        )));
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(DeconvError::InvalidParameter(format!(
            "PSF sigma must be positive, got {}",
            sigma
        )));
    }

    let k = gaussian_kernel_1d(size, sigma);
    let column = k.view().insert_axis(ndarray::Axis(1));
    let row = k.view().insert_axis(ndarray::Axis(0));
    let outer = column.dot(&row);

    // Outer product of unit-sum vectors; renormalize against float drift.
    let sum = outer.sum();
    Ok(Psf {
        kernel: outer / sum,
    })
}

/// Sampled 1D Gaussian of odd length, normalized to sum to 1.
pub(crate) fn gaussian_kernel_1d(size: usize, sigma: f32) -> Array1<f32> {
    let half = (size / 2) as i32;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel = Array1::from_shape_fn(size, |i| {
        let x = (i as i32 - half) as f32;
        (-x * x / two_sigma_sq).exp()
    });

    let sum = kernel.sum();
    kernel /= sum;
    kernel
}
