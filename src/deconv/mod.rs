//! Deconvolution module
//!
//! Restores images blurred by a known point-spread function.
//!
//! # Features
//!
//! - **Convolution** ([`convolve`]) - Same-size 2D convolution, spatial or FFT
//! - **Richardson-Lucy** ([`RichardsonLucy`]) - Iterative multiplicative deconvolution
//! - **Wiener** ([`WienerFilter`]) - One-shot regularized inverse filter
//! - **PSF** ([`Psf`]) - Kernel validation, Gaussian kernels, normalization
//!
//! # Example
//!
//! ```rust,no_run
//! use rl_deblur::deconv::{Psf, RichardsonLucy, RichardsonLucyOptions};
//! use rl_deblur::raster::load_image;
//! use std::path::Path;
//!
//! let blurred = load_image(Path::new("blurred.png"), true).unwrap();
//! let psf = Psf::gaussian(5, 1.0).unwrap();
//!
//! let options = RichardsonLucyOptions::builder().iterations(30).build();
//! let restored = RichardsonLucy::new(options).deblur(&blurred, &psf).unwrap();
//! assert_eq!(restored.shape(), blurred.shape());
//! ```

mod convolve;
mod fft;
mod psf;
mod richardson_lucy;
mod types;
mod wiener;

// Re-export public API
pub use convolve::{convolve, convolve_spatial, convolve_with};
pub use psf::Psf;
pub use richardson_lucy::{
    richardson_lucy, Deadline, IterationObserver, IterationSnapshot, NoopObserver,
    RichardsonLucy,
};
pub use types::{
    ConvolutionStrategy, DeconvError, Executor, NormalizationPolicy, Result,
    RichardsonLucyOptions, RichardsonLucyOptionsBuilder, WienerOptions, DEFAULT_EPSILON,
    DEFAULT_ITERATIONS, DEFAULT_NORMALIZATION_TOLERANCE, DEFAULT_WIENER_BALANCE,
};
pub use wiener::{wiener, WienerFilter};
