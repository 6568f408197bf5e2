//! 2D convolution engine
//!
//! Each channel of an image is convolved independently with the same
//! kernel and the output keeps the input size. For a kernel of edge `k`
//! the anchor is `c = k / 2` on both axes:
//!
//! ```text
//! Y[i, j] = Σ K[m, n] · X[i + c - m, j + c - n]
//! ```
//!
//! # Boundary policy
//!
//! - [`ConvolutionStrategy::Spatial`]: samples outside the image are zero.
//! - [`ConvolutionStrategy::Frequency`]: indices wrap modulo the image size
//!   (circular convolution), as FFT multiplication implies.
//!
//! Pixels whose kernel footprint lies inside the image agree between the
//! two strategies up to rounding.

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use tracing::trace;

use super::fft::{Fft2d, Spectrum};
use super::psf::Psf;
use super::types::{ConvolutionStrategy, DeconvError, Executor, Result};
use crate::raster::FloatImage;

/// Convolve every channel of `image` with `psf`, on the calling thread
pub fn convolve(
    image: &FloatImage,
    psf: &Psf,
    strategy: ConvolutionStrategy,
) -> Result<FloatImage> {
    convolve_with(image, psf, strategy, Executor::Sequential)
}

/// [`convolve`] with an explicit executor
pub fn convolve_with(
    image: &FloatImage,
    psf: &Psf,
    strategy: ConvolutionStrategy,
    executor: Executor,
) -> Result<FloatImage> {
    let (rows, cols, _) = image.shape();
    check_kernel_fits(psf, rows, cols)?;

    executor.install(|| {
        let convolver = Convolver::new(strategy, psf, rows, cols, executor.is_parallel());
        let planes = image.to_channels();
        let convolved: Vec<Array2<f64>> = if executor.is_parallel() {
            planes
                .par_iter()
                .map(|plane| convolver.forward(&plane.view()))
                .collect()
        } else {
            planes
                .iter()
                .map(|plane| convolver.forward(&plane.view()))
                .collect()
        };
        stack_channels(&convolved, image.shape())
    })?
}

/// Fail with [`DeconvError::KernelTooLarge`] if the kernel exceeds the image
pub(crate) fn check_kernel_fits(psf: &Psf, rows: usize, cols: usize) -> Result<()> {
    let k = psf.size();
    if k > rows || k > cols {
        return Err(DeconvError::KernelTooLarge {
            kernel_rows: k,
            kernel_cols: k,
            image_rows: rows,
            image_cols: cols,
        });
    }
    Ok(())
}

pub(crate) fn stack_channels(
    planes: &[Array2<f64>],
    shape: (usize, usize, usize),
) -> Result<FloatImage> {
    let mut data = Array3::zeros(shape);
    for (ch, plane) in planes.iter().enumerate() {
        data.index_axis_mut(Axis(2), ch).assign(plane);
    }
    Ok(FloatImage::new(data)?)
}

/// Kernel prepared for repeated convolution of planes of one size
///
/// Holds both the kernel and its 180° rotation so the forward model and
/// its adjoint can be applied without rebuilding anything per call.
pub(crate) enum Convolver {
    Spatial {
        forward: Array2<f64>,
        adjoint: Array2<f64>,
        parallel: bool,
    },
    Frequency {
        fft: Fft2d,
        forward: Spectrum,
        adjoint: Spectrum,
    },
}

impl Convolver {
    pub fn new(
        strategy: ConvolutionStrategy,
        psf: &Psf,
        rows: usize,
        cols: usize,
        parallel: bool,
    ) -> Self {
        let flipped = psf.flipped();
        trace!(
            "Preparing {} convolver ({}x{}, kernel {})",
            strategy.name(),
            rows,
            cols,
            psf.size()
        );

        match strategy {
            ConvolutionStrategy::Spatial => Convolver::Spatial {
                forward: psf.as_array().clone(),
                adjoint: flipped.as_array().clone(),
                parallel,
            },
            ConvolutionStrategy::Frequency => {
                let fft = Fft2d::new(rows, cols);
                let forward = fft.kernel_spectrum(&psf.view());
                let adjoint = fft.kernel_spectrum(&flipped.view());
                Convolver::Frequency {
                    fft,
                    forward,
                    adjoint,
                }
            }
        }
    }

    /// Convolve with the kernel
    pub fn forward(&self, plane: &ArrayView2<f64>) -> Array2<f64> {
        match self {
            Convolver::Spatial {
                forward, parallel, ..
            } => convolve_spatial(plane, forward, *parallel),
            Convolver::Frequency { fft, forward, .. } => convolve_spectral(fft, plane, forward),
        }
    }

    /// Convolve with the flipped kernel
    pub fn adjoint(&self, plane: &ArrayView2<f64>) -> Array2<f64> {
        match self {
            Convolver::Spatial {
                adjoint, parallel, ..
            } => convolve_spatial(plane, adjoint, *parallel),
            Convolver::Frequency { fft, adjoint, .. } => convolve_spectral(fft, plane, adjoint),
        }
    }
}

/// Zero-padded "same" convolution of one plane
pub fn convolve_spatial(
    plane: &ArrayView2<f64>,
    kernel: &Array2<f64>,
    parallel: bool,
) -> Array2<f64> {
    let (rows, cols) = plane.dim();
    let (k_rows, k_cols) = kernel.dim();
    let (anchor_r, anchor_c) = (k_rows / 2, k_cols / 2);

    // Only kernel taps landing inside the image are visited.
    let sample = |(i, j): (usize, usize)| -> f64 {
        let m_lo = (i + anchor_r + 1).saturating_sub(rows);
        let m_hi = (i + anchor_r).min(k_rows - 1);
        let n_lo = (j + anchor_c + 1).saturating_sub(cols);
        let n_hi = (j + anchor_c).min(k_cols - 1);

        let mut sum = 0.0;
        for m in m_lo..=m_hi {
            let r = i + anchor_r - m;
            for n in n_lo..=n_hi {
                sum += kernel[[m, n]] * plane[[r, j + anchor_c - n]];
            }
        }
        sum
    };

    let mut output = Array2::zeros((rows, cols));
    if parallel {
        Zip::indexed(&mut output).par_for_each(|idx, out| *out = sample(idx));
    } else {
        Zip::indexed(&mut output).for_each(|idx, out| *out = sample(idx));
    }
    output
}

fn convolve_spectral(fft: &Fft2d, plane: &ArrayView2<f64>, kernel: &Spectrum) -> Array2<f64> {
    let mut spectrum = fft.forward(plane);
    spectrum.multiply(kernel);
    fft.inverse_real(spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize, channels: usize) -> FloatImage {
        FloatImage::from_fn(rows, cols, channels, |r, c, ch| {
            ((r * 31 + c * 17 + ch * 7) % 23) as f64 / 22.0
        })
        .unwrap()
    }

    fn assert_close(a: &FloatImage, b: &FloatImage, tol: f64) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.as_array().iter().zip(b.as_array().iter()) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_identity_kernel_spatial() {
        let img = ramp(7, 9, 3);
        let out = convolve(&img, &Psf::identity(), ConvolutionStrategy::Spatial).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_identity_kernel_frequency() {
        let img = ramp(7, 9, 3);
        let out = convolve(&img, &Psf::identity(), ConvolutionStrategy::Frequency).unwrap();
        assert_close(&out, &img, 1e-12);
    }

    #[test]
    fn test_kernel_too_large() {
        let img = ramp(4, 10, 1);
        let psf = Psf::gaussian(5, 1.0).unwrap();
        let err = convolve(&img, &psf, ConvolutionStrategy::Spatial).unwrap_err();
        assert!(matches!(
            err,
            DeconvError::KernelTooLarge {
                kernel_rows: 5,
                image_rows: 4,
                ..
            }
        ));
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_shift_kernel_direction() {
        // Tap at (0, 0) with anchor (1, 1) reads X[i + 1, j + 1].
        let mut kernel = Array2::zeros((3, 3));
        kernel[[0, 0]] = 1.0;
        let psf = Psf::new(kernel).unwrap();
        let img = ramp(5, 5, 1);
        let out = convolve(&img, &psf, ConvolutionStrategy::Spatial).unwrap();

        assert_eq!(out.as_array()[[1, 1, 0]], img.as_array()[[2, 2, 0]]);
        assert_eq!(out.as_array()[[4, 4, 0]], 0.0);
    }

    #[test]
    fn test_strategies_agree_in_interior() {
        let img = ramp(16, 12, 2);
        let psf = Psf::gaussian(5, 1.2).unwrap();
        let spatial = convolve(&img, &psf, ConvolutionStrategy::Spatial).unwrap();
        let freq = convolve(&img, &psf, ConvolutionStrategy::Frequency).unwrap();

        for r in 2..14 {
            for c in 2..10 {
                for ch in 0..2 {
                    let a = spatial.as_array()[[r, c, ch]];
                    let b = freq.as_array()[[r, c, ch]];
                    assert!((a - b).abs() < 1e-10, "({r},{c}) {a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn test_frequency_wraps_at_border() {
        let mut data = Array3::zeros((6, 6, 1));
        data[[0, 0, 0]] = 1.0;
        let img = FloatImage::new(data).unwrap();
        let psf = Psf::new(Array2::from_elem((3, 3), 1.0 / 9.0)).unwrap();

        let spatial = convolve(&img, &psf, ConvolutionStrategy::Spatial).unwrap();
        let freq = convolve(&img, &psf, ConvolutionStrategy::Frequency).unwrap();

        assert_eq!(spatial.as_array()[[5, 5, 0]], 0.0);
        assert!((freq.as_array()[[5, 5, 0]] - 1.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_even_kernel_size() {
        let img = ramp(8, 8, 1);
        let psf = Psf::new(Array2::from_elem((2, 2), 0.25)).unwrap();
        let spatial = convolve(&img, &psf, ConvolutionStrategy::Spatial).unwrap();
        let freq = convolve(&img, &psf, ConvolutionStrategy::Frequency).unwrap();
        assert_eq!(spatial.shape(), img.shape());
        // Anchor (1, 1): footprint is X[i..=i+1, j..=j+1].
        let expected = (img.as_array()[[3, 3, 0]]
            + img.as_array()[[3, 4, 0]]
            + img.as_array()[[4, 3, 0]]
            + img.as_array()[[4, 4, 0]])
            / 4.0;
        assert!((spatial.as_array()[[3, 3, 0]] - expected).abs() < 1e-12);
        assert!((freq.as_array()[[3, 3, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let img = ramp(20, 15, 3);
        let psf = Psf::gaussian(7, 1.5).unwrap();
        let seq = convolve(&img, &psf, ConvolutionStrategy::Spatial).unwrap();
        let par = convolve_with(
            &img,
            &psf,
            ConvolutionStrategy::Spatial,
            Executor::Parallel { threads: Some(3) },
        )
        .unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_adjoint_uses_flipped_kernel() {
        let mut kernel = Array2::zeros((3, 3));
        kernel[[0, 1]] = 1.0;
        let psf = Psf::new(kernel).unwrap();
        let plane = Array2::from_shape_fn((5, 5), |(r, c)| (r * 5 + c) as f64);

        let convolver = Convolver::new(ConvolutionStrategy::Spatial, &psf, 5, 5, false);
        let fwd = convolver.forward(&plane.view());
        let adj = convolver.adjoint(&plane.view());

        // Forward reads the row below, adjoint the row above.
        assert_eq!(fwd[[2, 2]], plane[[3, 2]]);
        assert_eq!(adj[[2, 2]], plane[[1, 2]]);
    }
}
