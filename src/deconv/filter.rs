//! 2D filtering primitives
//!
//! Two interchangeable strategies apply a small kernel to a channel:
//!
//! - [`SpatialFilter`] - direct correlation with reflect-101 borders
//!   (`dcb|abcd|cba`, the edge sample is not repeated)
//! - [`FrequencyFilter`] - FFT multiplication, i.e. circular convolution
//!
//! The two agree in the interior for symmetric kernels. Near the borders the
//! frequency path wraps around the image instead of reflecting; this is an
//! accepted approximation and is kept as-is so both backends stay stable.

use ndarray::{Array2, ArrayView2};

use super::psf::gaussian_kernel_1d;
use super::types::{ensure_kernel_fits, Result};

/// Gaussian support in units of sigma
const GAUSSIAN_TRUNCATE: f32 = 4.0;

/// A 2D filtering implementation.
///
/// The output always has the same shape as `grid`. A kernel larger than the
/// grid in either dimension fails with `InvalidKernelSize`.
pub trait FilterStrategy: Send + Sync {
    /// Apply `kernel` to `grid`
    fn filter2d(&self, grid: ArrayView2<f32>, kernel: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Map an out-of-range index into `0..n` using reflect-101 mirroring.
#[inline]
pub(crate) fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    (if m >= n { period - m } else { m }) as usize
}

/// Border lookup table: for each output index, the `taps` source indices
/// starting at `-(taps / 2)`.
fn border_table(len: usize, taps: usize) -> Vec<usize> {
    let half = (taps / 2) as isize;
    let mut table = Vec::with_capacity(len * taps);
    for i in 0..len as isize {
        for t in 0..taps as isize {
            table.push(reflect_101(i + t - half, len));
        }
    }
    table
}

// ============================================================
// Spatial
// ============================================================

/// Direct spatial correlation
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialFilter;

impl FilterStrategy for SpatialFilter {
    fn filter2d(&self, grid: ArrayView2<f32>, kernel: ArrayView2<f32>) -> Result<Array2<f32>> {
        ensure_kernel_fits(kernel.dim(), grid.dim())?;

        let (h, w) = grid.dim();
        let (kh, kw) = kernel.dim();
        let rows = border_table(h, kh);
        let cols = border_table(w, kw);

        Ok(Array2::from_shape_fn((h, w), |(r, c)| {
            let row_taps = &rows[r * kh..(r + 1) * kh];
            let col_taps = &cols[c * kw..(c + 1) * kw];
            let mut sum = 0.0f32;
            for (ki, &sr) in row_taps.iter().enumerate() {
                for (kj, &sc) in col_taps.iter().enumerate() {
                    sum += kernel[[ki, kj]] * grid[[sr, sc]];
                }
            }
            sum
        }))
    }

    fn name(&self) -> &'static str {
        "spatial"
    }
}

/// Separable Gaussian blur with reflect-101 borders.
///
/// The kernel radius is `round(4 * sigma)`, so the support may exceed the
/// grid; the border mirroring handles that.
pub fn gaussian_blur(grid: ArrayView2<f32>, sigma: f32) -> Array2<f32> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as usize;
    let kernel = gaussian_kernel_1d(2 * radius + 1, sigma);
    let taps = kernel.len();
    let (h, w) = grid.dim();

    // Horizontal pass
    let cols = border_table(w, taps);
    let temp = Array2::from_shape_fn((h, w), |(r, c)| {
        cols[c * taps..(c + 1) * taps]
            .iter()
            .zip(kernel.iter())
            .map(|(&sc, &kv)| grid[[r, sc]] * kv)
            .sum::<f32>()
    });

    // Vertical pass
    let rows = border_table(h, taps);
    Array2::from_shape_fn((h, w), |(r, c)| {
        rows[r * taps..(r + 1) * taps]
            .iter()
            .zip(kernel.iter())
            .map(|(&sr, &kv)| temp[[sr, c]] * kv)
            .sum::<f32>()
    })
}

// ============================================================
// Frequency
// ============================================================

#[cfg(feature = "fft")]
pub use self::frequency::FrequencyFilter;

#[cfg(feature = "fft")]
mod frequency {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, PoisonError};

    use ndarray::{Array2, ArrayView2};
    use rustfft::num_complex::Complex;
    use rustfft::{Fft, FftPlanner};

    use super::FilterStrategy;
    use crate::deconv::types::{ensure_kernel_fits, Result};

    /// Grid shapes kept in the plan cache; a new shape past this evicts them all.
    pub(super) const MAX_CACHED_PLANS: usize = 8;

    /// Forward and inverse plans for one grid shape
    pub(super) struct Plan2d {
        rows: usize,
        cols: usize,
        row_forward: Arc<dyn Fft<f32>>,
        col_forward: Arc<dyn Fft<f32>>,
        row_inverse: Arc<dyn Fft<f32>>,
        col_inverse: Arc<dyn Fft<f32>>,
    }

    impl Plan2d {
        fn new(rows: usize, cols: usize) -> Self {
            let mut planner = FftPlanner::<f32>::new();
            Self {
                rows,
                cols,
                row_forward: planner.plan_fft_forward(cols),
                col_forward: planner.plan_fft_forward(rows),
                row_inverse: planner.plan_fft_inverse(cols),
                col_inverse: planner.plan_fft_inverse(rows),
            }
        }

        fn forward(&self, buffer: &mut [Complex<f32>]) {
            self.transform(buffer, &self.row_forward, &self.col_forward);
        }

        fn inverse(&self, buffer: &mut [Complex<f32>]) {
            self.transform(buffer, &self.row_inverse, &self.col_inverse);
        }

        /// Row pass over the whole buffer, then a column pass through a scratch column.
        fn transform(
            &self,
            buffer: &mut [Complex<f32>],
            row_fft: &Arc<dyn Fft<f32>>,
            col_fft: &Arc<dyn Fft<f32>>,
        ) {
            let (rows, cols) = (self.rows, self.cols);
            row_fft.process(buffer);

            let mut column = vec![Complex::new(0.0, 0.0); rows];
            for c in 0..cols {
                for r in 0..rows {
                    column[r] = buffer[r * cols + c];
                }
                col_fft.process(&mut column);
                for r in 0..rows {
                    buffer[r * cols + c] = column[r];
                }
            }
        }
    }

    /// Frequency-domain filtering (circular convolution)
    ///
    /// Plans are cached per grid shape, so repeated calls on same-sized
    /// channels only pay for the transforms. At most `MAX_CACHED_PLANS`
    /// shapes are held at once.
    #[derive(Default)]
    pub struct FrequencyFilter {
        pub(super) plans: Mutex<HashMap<(usize, usize), Arc<Plan2d>>>,
    }

    impl std::fmt::Debug for FrequencyFilter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FrequencyFilter").finish_non_exhaustive()
        }
    }

    impl FrequencyFilter {
        pub fn new() -> Self {
            Self::default()
        }

        fn plan(&self, rows: usize, cols: usize) -> Arc<Plan2d> {
            let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
            if plans.len() >= MAX_CACHED_PLANS && !plans.contains_key(&(rows, cols)) {
                plans.clear();
            }
            plans
                .entry((rows, cols))
                .or_insert_with(|| Arc::new(Plan2d::new(rows, cols)))
                .clone()
        }
    }

    impl FilterStrategy for FrequencyFilter {
        fn filter2d(&self, grid: ArrayView2<f32>, kernel: ArrayView2<f32>) -> Result<Array2<f32>> {
            ensure_kernel_fits(kernel.dim(), grid.dim())?;

            let (h, w) = grid.dim();
            let (kh, kw) = kernel.dim();
            let plan = self.plan(h, w);

            let mut image: Vec<Complex<f32>> =
                grid.iter().map(|&v| Complex::new(v, 0.0)).collect();

            // Zero-pad the kernel and roll its center onto (0, 0).
            let mut padded = vec![Complex::new(0.0, 0.0); h * w];
            let (shift_r, shift_c) = (kh / 2, kw / 2);
            for ((i, j), &v) in kernel.indexed_iter() {
                let r = (i + h - shift_r) % h;
                let c = (j + w - shift_c) % w;
                padded[r * w + c] = Complex::new(v, 0.0);
            }

            plan.forward(&mut image);
            plan.forward(&mut padded);
            for (a, b) in image.iter_mut().zip(padded.iter()) {
                *a *= *b;
            }
            plan.inverse(&mut image);

            let scale = 1.0 / (h * w) as f32;
            Ok(Array2::from_shape_fn((h, w), |(r, c)| image[r * w + c].re * scale))
        }

        fn name(&self) -> &'static str {
            "frequency"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deconv::psf::generate_psf;
    use crate::deconv::types::DeconvError;
    use ndarray::array;

    fn ramp(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(r, c)| (r * w + c) as f32 / (h * w) as f32)
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 4), 1);
        assert_eq!(reflect_101(-2, 4), 2);
        assert_eq!(reflect_101(0, 4), 0);
        assert_eq!(reflect_101(3, 4), 3);
        assert_eq!(reflect_101(4, 4), 2);
        assert_eq!(reflect_101(5, 4), 1);
        assert_eq!(reflect_101(-7, 4), 1);
        assert_eq!(reflect_101(9, 2), 1);
        assert_eq!(reflect_101(-3, 1), 0);
    }

    #[test]
    fn test_spatial_identity_kernel() {
        let grid = ramp(6, 9);
        let out = SpatialFilter.filter2d(grid.view(), array![[1.0f32]].view()).unwrap();
        assert_eq!(out, grid);
    }

    #[test]
    fn test_spatial_shape_preserved() {
        let grid = ramp(5, 11);
        let psf = generate_psf(5, 1.0).unwrap();
        let out = SpatialFilter.filter2d(grid.view(), psf.kernel().view()).unwrap();
        assert_eq!(out.dim(), (5, 11));
    }

    #[test]
    fn test_spatial_is_correlation() {
        let mut grid = Array2::zeros((5, 5));
        grid[[2, 2]] = 1.0f32;
        let kernel = array![[0.0f32, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]];
        let out = SpatialFilter.filter2d(grid.view(), kernel.view()).unwrap();
        // Correlation samples the right neighbour, so the impulse moves left.
        assert_eq!(out[[2, 1]], 1.0);
        assert_eq!(out.sum(), 1.0);
    }

    #[test]
    fn test_spatial_reflect_border() {
        let grid = array![[1.0f32, 2.0, 3.0]];
        let kernel = array![[1.0f32, 0.0, 0.0]];
        let out = SpatialFilter.filter2d(grid.view(), kernel.view()).unwrap();
        // Left neighbour of index 0 mirrors to index 1.
        assert_eq!(out, array![[2.0f32, 1.0, 2.0]]);
    }

    #[test]
    fn test_spatial_uniform_fixed_point() {
        let grid = Array2::from_elem((8, 8), 0.5f32);
        let psf = generate_psf(5, 1.5).unwrap();
        let out = SpatialFilter.filter2d(grid.view(), psf.kernel().view()).unwrap();
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_spatial_kernel_too_large() {
        let grid = ramp(3, 10);
        let psf = generate_psf(5, 1.0).unwrap();
        let err = SpatialFilter.filter2d(grid.view(), psf.kernel().view()).unwrap_err();
        assert!(matches!(err, DeconvError::InvalidKernelSize { .. }));
    }

    #[test]
    fn test_gaussian_blur_preserves_uniform() {
        let grid = Array2::from_elem((7, 5), 0.25f32);
        let out = gaussian_blur(grid.view(), 1.0);
        assert_eq!(out.dim(), (7, 5));
        assert!(out.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_gaussian_blur_spreads_impulse() {
        let mut grid = Array2::zeros((15, 15));
        grid[[7, 7]] = 1.0f32;
        let out = gaussian_blur(grid.view(), 1.0);
        assert!(out[[7, 7]] < 1.0);
        assert!(out[[7, 8]] > 0.0);
        assert!((out[[7, 6]] - out[[7, 8]]).abs() < 1e-7);
        assert!((out.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_gaussian_blur_small_grid() {
        // Support wider than the grid must still mirror correctly.
        let grid = array![[0.0f32, 1.0], [1.0, 0.0]];
        let out = gaussian_blur(grid.view(), 2.0);
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[cfg(feature = "fft")]
    mod frequency {
        use super::*;

        #[test]
        fn test_frequency_identity_kernel() {
            let grid = ramp(6, 10);
            let out = FrequencyFilter::new()
                .filter2d(grid.view(), array![[1.0f32]].view())
                .unwrap();
            for (a, b) in out.iter().zip(grid.iter()) {
                assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
            }
        }

        #[test]
        fn test_frequency_shape_preserved() {
            let grid = ramp(9, 4);
            let psf = generate_psf(3, 1.0).unwrap();
            let out = FrequencyFilter::new()
                .filter2d(grid.view(), psf.kernel().view())
                .unwrap();
            assert_eq!(out.dim(), (9, 4));
        }

        #[test]
        fn test_frequency_uniform_fixed_point() {
            let grid = Array2::from_elem((16, 12), 0.5f32);
            let psf = generate_psf(5, 1.0).unwrap();
            let out = FrequencyFilter::new()
                .filter2d(grid.view(), psf.kernel().view())
                .unwrap();
            assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-5));
        }

        #[test]
        fn test_frequency_matches_spatial_interior() {
            let grid = Array2::from_shape_fn((16, 16), |(r, c)| ((r * 7 + c * 3) % 11) as f32 / 10.0);
            let psf = generate_psf(3, 1.0).unwrap();
            let spatial = SpatialFilter.filter2d(grid.view(), psf.kernel().view()).unwrap();
            let freq = FrequencyFilter::new()
                .filter2d(grid.view(), psf.kernel().view())
                .unwrap();
            for r in 1..15 {
                for c in 1..15 {
                    assert!((spatial[[r, c]] - freq[[r, c]]).abs() < 1e-4);
                }
            }
        }

        #[test]
        fn test_frequency_wraps_at_border() {
            let mut grid = Array2::zeros((4, 4));
            grid[[0, 0]] = 1.0f32;
            let kernel = Array2::from_elem((3, 3), 1.0f32 / 9.0);
            let out = FrequencyFilter::new()
                .filter2d(grid.view(), kernel.view())
                .unwrap();
            // Circular convolution spills the corner impulse onto the far corner.
            assert!((out[[3, 3]] - 1.0 / 9.0).abs() < 1e-5);
            assert!((out.sum() - 1.0).abs() < 1e-5);
        }

        #[test]
        fn test_frequency_kernel_too_large() {
            let grid = ramp(4, 4);
            let kernel = Array2::from_elem((5, 1), 0.2f32);
            assert!(matches!(
                FrequencyFilter::new().filter2d(grid.view(), kernel.view()),
                Err(DeconvError::InvalidKernelSize { .. })
            ));
        }

        #[test]
        fn test_frequency_plan_cache_reused() {
            let filter = FrequencyFilter::new();
            let grid = ramp(8, 8);
            let kernel = array![[1.0f32]];
            filter.filter2d(grid.view(), kernel.view()).unwrap();
            filter.filter2d(grid.view(), kernel.view()).unwrap();
            filter.filter2d(ramp(4, 8).view(), kernel.view()).unwrap();
            assert_eq!(filter.plans.lock().unwrap().len(), 2);
        }

        #[test]
        fn test_frequency_plan_cache_bounded() {
            use super::super::frequency::MAX_CACHED_PLANS;

            let filter = FrequencyFilter::new();
            let kernel = array![[1.0f32]];
            for rows in 1..=MAX_CACHED_PLANS + 3 {
                let grid = ramp(rows, 4);
                let out = filter.filter2d(grid.view(), kernel.view()).unwrap();
                assert!((out[[rows - 1, 3]] - grid[[rows - 1, 3]]).abs() < 1e-5);
                assert!(filter.plans.lock().unwrap().len() <= MAX_CACHED_PLANS);
            }
        }
    }
}
