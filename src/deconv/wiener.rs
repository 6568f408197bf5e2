//! Wiener deconvolution
//!
//! One-shot regularized inverse filter in the frequency domain:
//!
//! ```text
//! W = conj(H) / (|H|² + balance · |R|²)
//! X = IFFT(W · FFT(B))
//! ```
//!
//! `H` is the PSF transfer function and `R` the transfer function of the
//! discrete Laplacian, which damps high frequencies. Like every FFT path in
//! this crate the boundary is circular.

use ndarray::{arr2, Array2};
use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use tracing::info;

use super::convolve::{check_kernel_fits, stack_channels};
use super::fft::{Fft2d, Spectrum};
use super::psf::Psf;
use super::types::{DeconvError, Result, WienerOptions};
use crate::raster::FloatImage;

/// 4-neighbour discrete Laplacian
fn laplacian() -> Array2<f64> {
    arr2(&[[0.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 0.0]])
}

/// Wiener deconvolution filter
#[derive(Debug, Clone, Default)]
pub struct WienerFilter {
    options: WienerOptions,
}

impl WienerFilter {
    pub fn new(options: WienerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WienerOptions {
        &self.options
    }

    /// Deblur every channel of `blurred`, clamping the result to `[0, 1]`
    pub fn deblur(&self, blurred: &FloatImage, psf: &Psf) -> Result<FloatImage> {
        let balance = self.options.balance;
        if !(balance.is_finite() && balance >= 0.0) {
            return Err(DeconvError::InvalidParameter(format!(
                "balance must be finite and non-negative, got {}",
                balance
            )));
        }
        let shape = blurred.shape();
        let (rows, cols, channels) = shape;
        check_kernel_fits(psf, rows, cols)?;
        if !blurred.all_finite() {
            return Err(DeconvError::InvalidParameter(
                "image contains non-finite samples".to_string(),
            ));
        }
        let psf = psf.conform(
            self.options.normalization,
            self.options.normalization_tolerance,
        )?;

        info!(
            "Wiener: {}x{}x{}, kernel {}, balance {}",
            rows,
            cols,
            channels,
            psf.size(),
            balance
        );

        let executor = self.options.executor;
        executor.install(|| {
            let fft = Fft2d::new(rows, cols);
            let filter = filter_spectrum(&fft, &psf, balance);
            let planes = blurred.to_channels();

            let restore = |plane: &Array2<f64>| {
                let mut spectrum = fft.forward(&plane.view());
                spectrum.multiply(&filter);
                fft.inverse_real(spectrum)
            };
            let restored: Vec<Array2<f64>> = if executor.is_parallel() {
                planes.par_iter().map(restore).collect()
            } else {
                planes.iter().map(restore).collect()
            };

            stack_channels(&restored, shape).map(FloatImage::clamped)
        })?
    }
}

/// Build `W` for one image size
fn filter_spectrum(fft: &Fft2d, psf: &Psf, balance: f64) -> Spectrum {
    let mut filter = fft.kernel_spectrum(&psf.view());
    let regularizer = fft.kernel_spectrum(&laplacian().view());
    let zero = Complex64::new(0.0, 0.0);

    for (w, r) in filter.as_mut_slice().iter_mut().zip(regularizer.as_slice()) {
        let denominator = w.norm_sqr() + balance * r.norm_sqr();
        *w = if denominator == 0.0 {
            zero
        } else {
            w.conj() / denominator
        };
    }
    filter
}

/// Wiener deconvolution with default options and the given balance
pub fn wiener(blurred: &FloatImage, psf: &Psf, balance: f64) -> Result<FloatImage> {
    WienerFilter::new(WienerOptions::with_balance(balance)).deblur(blurred, psf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deconv::convolve::convolve;
    use crate::deconv::types::{ConvolutionStrategy, Executor};
    use crate::metrics::mse;

    fn step_edge() -> FloatImage {
        FloatImage::from_fn(32, 32, 1, |_, c, _| if c < 16 { 0.2 } else { 0.8 }).unwrap()
    }

    #[test]
    fn test_recovers_blurred_step() {
        let sharp = step_edge();
        let psf = Psf::gaussian(5, 1.0).unwrap();
        let blurred = convolve(&sharp, &psf, ConvolutionStrategy::Frequency).unwrap();

        let restored = wiener(&blurred, &psf, 0.01).unwrap();
        let before = mse(&sharp, &blurred).unwrap();
        let after = mse(&sharp, &restored).unwrap();
        assert!(after < before, "restored {after} vs blurred {before}");
    }

    #[test]
    fn test_identity_psf_without_regularization() {
        let img = FloatImage::from_fn(8, 6, 3, |r, c, ch| ((r + 2 * c + ch) % 7) as f64 / 6.0)
            .unwrap();
        let out = wiener(&img, &Psf::identity(), 0.0).unwrap();
        for (a, b) in img.as_array().iter().zip(out.as_array().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_output_in_unit_range() {
        let img = step_edge();
        let psf = Psf::gaussian(7, 2.0).unwrap();
        let out = wiener(&img, &psf, 0.001).unwrap();
        assert!(out.is_unit_range());
        assert_eq!(out.shape(), img.shape());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let img = FloatImage::from_fn(12, 10, 3, |r, c, ch| ((r * 3 + c + ch) % 5) as f64 / 4.0)
            .unwrap();
        let psf = Psf::gaussian(3, 0.8).unwrap();
        let seq = WienerFilter::new(WienerOptions {
            executor: Executor::Sequential,
            ..Default::default()
        })
        .deblur(&img, &psf)
        .unwrap();
        let par = WienerFilter::new(WienerOptions {
            executor: Executor::Parallel { threads: Some(2) },
            ..Default::default()
        })
        .deblur(&img, &psf)
        .unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_rejects_bad_balance() {
        let img = step_edge();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        assert!(matches!(
            wiener(&img, &psf, -0.5),
            Err(DeconvError::InvalidParameter(_))
        ));
        assert!(matches!(
            wiener(&img, &psf, f64::NAN),
            Err(DeconvError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_large_kernel() {
        let img = FloatImage::zeros(4, 4, 1).unwrap();
        let psf = Psf::gaussian(9, 2.0).unwrap();
        assert!(wiener(&img, &psf, 0.01).unwrap_err().is_shape_error());
    }

    #[test]
    fn test_strict_normalization() {
        let img = step_edge();
        let psf = Psf::new(Array2::from_elem((3, 3), 1.0)).unwrap();
        assert!(matches!(
            wiener(&img, &psf, 0.01),
            Err(DeconvError::PsfNotNormalized { .. })
        ));
    }
}
