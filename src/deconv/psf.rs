//! Point-spread function
//!
//! A PSF is a square, non-negative kernel. Whether it must sum to one is
//! decided by the caller's [`NormalizationPolicy`].

use ndarray::{Array2, ArrayView2};

use super::types::{DeconvError, NormalizationPolicy, Result};

/// Square, non-negative convolution kernel
#[derive(Debug, Clone, PartialEq)]
pub struct Psf {
    kernel: Array2<f64>,
}

impl Psf {
    /// Validate and wrap a kernel
    ///
    /// The kernel must be non-empty, square, finite and non-negative.
    pub fn new(kernel: Array2<f64>) -> Result<Self> {
        let (rows, cols) = kernel.dim();
        if rows == 0 || cols == 0 {
            return Err(DeconvError::InvalidPsf("kernel is empty".to_string()));
        }
        if rows != cols {
            return Err(DeconvError::InvalidPsf(format!(
                "kernel must be square, got {}x{}",
                rows, cols
            )));
        }
        if let Some(bad) = kernel.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(DeconvError::InvalidPsf(format!(
                "entries must be finite and non-negative, found {}",
                bad
            )));
        }
        Ok(Self { kernel })
    }

    /// 1x1 kernel of value 1.0
    pub fn identity() -> Self {
        Self {
            kernel: Array2::ones((1, 1)),
        }
    }

    /// Normalized `size`x`size` Gaussian kernel
    ///
    /// Samples `exp(-x² / 2σ²)` at `x = i - (size - 1) / 2`, takes the outer
    /// product and divides by the sum. A non-positive `sigma` is derived from
    /// the size as `0.3 * ((size - 1) / 2 - 1) + 0.8`.
    pub fn gaussian(size: usize, sigma: f64) -> Result<Self> {
        if size == 0 {
            return Err(DeconvError::InvalidPsf("size must be positive".to_string()));
        }
        if !sigma.is_finite() {
            return Err(DeconvError::InvalidParameter(format!(
                "sigma must be finite, got {}",
                sigma
            )));
        }

        let sigma = if sigma > 0.0 {
            sigma
        } else {
            0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
        };
        let center = (size as f64 - 1.0) / 2.0;
        let profile: Vec<f64> = (0..size)
            .map(|i| {
                let x = i as f64 - center;
                (-(x * x) / (2.0 * sigma * sigma)).exp()
            })
            .collect();

        let kernel = Array2::from_shape_fn((size, size), |(r, c)| profile[r] * profile[c]);
        Self::new(kernel)?.normalized()
    }

    /// Edge length
    pub fn size(&self) -> usize {
        self.kernel.nrows()
    }

    /// Anchor index along each axis
    pub fn center(&self) -> usize {
        self.size() / 2
    }

    pub fn sum(&self) -> f64 {
        self.kernel.sum()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.kernel.view()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.kernel
    }

    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.sum() - 1.0).abs() <= tolerance
    }

    /// Copy scaled to sum to one
    pub fn normalized(&self) -> Result<Self> {
        let sum = self.sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(DeconvError::InvalidPsf(format!(
                "cannot normalize kernel with sum {}",
                sum
            )));
        }
        Ok(Self {
            kernel: self.kernel.mapv(|v| v / sum),
        })
    }

    /// Kernel rotated by 180 degrees (the adjoint)
    pub fn flipped(&self) -> Self {
        let n = self.size();
        Self {
            kernel: Array2::from_shape_fn((n, n), |(r, c)| self.kernel[[n - 1 - r, n - 1 - c]]),
        }
    }

    /// Apply a normalization policy
    pub fn conform(&self, policy: NormalizationPolicy, tolerance: f64) -> Result<Self> {
        match policy {
            NormalizationPolicy::Strict => {
                if self.is_normalized(tolerance) {
                    Ok(self.clone())
                } else {
                    Err(DeconvError::PsfNotNormalized { sum: self.sum() })
                }
            }
            NormalizationPolicy::Renormalize => self.normalized(),
            NormalizationPolicy::Assume => Ok(self.clone()),
        }
    }
}
