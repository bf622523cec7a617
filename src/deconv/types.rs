//! Common types for the deconvolution module

use thiserror::Error;

/// Deconvolution error types
#[derive(Debug, Error, PartialEq)]
pub enum DeconvError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(
        "Invalid kernel size: kernel {}x{} does not fit grid {}x{}",
        .kernel.0, .kernel.1, .grid.0, .grid.1
    )]
    InvalidKernelSize {
        /// Kernel shape (rows, cols)
        kernel: (usize, usize),
        /// Grid shape (rows, cols)
        grid: (usize, usize),
    },

    #[error("Numeric instability: non-finite estimate after iteration {iteration}")]
    NumericInstability { iteration: usize },

    #[error("Cancelled after {completed} iteration(s)")]
    Cancelled { completed: usize },
}

pub type Result<T> = std::result::Result<T, DeconvError>;

/// Fail with `InvalidKernelSize` when `kernel` exceeds `grid` in either dimension.
pub(crate) fn ensure_kernel_fits(kernel: (usize, usize), grid: (usize, usize)) -> Result<()> {
    if kernel.0 > grid.0 || kernel.1 > grid.1 || kernel.0 == 0 || kernel.1 == 0 {
        return Err(DeconvError::InvalidKernelSize { kernel, grid });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_fits() {
        assert!(ensure_kernel_fits((3, 3), (3, 3)).is_ok());
        assert!(ensure_kernel_fits((1, 1), (16, 8)).is_ok());
    }

    #[test]
    fn test_kernel_too_large() {
        let err = ensure_kernel_fits((5, 5), (4, 10)).unwrap_err();
        assert_eq!(
            err,
            DeconvError::InvalidKernelSize {
                kernel: (5, 5),
                grid: (4, 10)
            }
        );
        assert!(err.to_string().contains("5x5"));
        assert!(err.to_string().contains("4x10"));
    }

    #[test]
    fn test_empty_kernel_rejected() {
        assert!(ensure_kernel_fits((0, 3), (8, 8)).is_err());
    }
}
