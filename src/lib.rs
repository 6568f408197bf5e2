//! rl-deblur - Richardson-Lucy image deblurring
//!
//! Restores images blurred by a known point-spread function.
//!
//! # Modules
//!
//! - [`raster`] - Floating-point image buffers and file I/O
//! - [`deconv`] - Convolution, Richardson-Lucy and Wiener deconvolution
//! - [`postprocess`] - Median / NL-means denoising and unsharp masking
//! - [`metrics`] - MSE, PSNR and SSIM
//! - [`pipeline`] - Load, restore and save one image
//! - [`config`] - TOML configuration merged with CLI flags
//! - [`cli`] - Command-line definitions
//! - [`progress`] - Output modes and iteration progress bar
//!
//! # Example
//!
//! ```rust
//! use rl_deblur::{convolve, ConvolutionStrategy, FloatImage, Psf, RichardsonLucy};
//! use rl_deblur::RichardsonLucyOptions;
//!
//! let sharp = FloatImage::from_fn(32, 32, 1, |r, c, _| ((r / 4 + c / 4) % 2) as f64).unwrap();
//! let psf = Psf::gaussian(5, 1.0).unwrap();
//! let blurred = convolve(&sharp, &psf, ConvolutionStrategy::Spatial).unwrap();
//!
//! let options = RichardsonLucyOptions::builder().iterations(10).build();
//! let restored = RichardsonLucy::new(options).deblur(&blurred, &psf).unwrap();
//! assert_eq!(restored.shape(), sharp.shape());
//! ```

pub mod cli;
pub mod config;
pub mod deconv;
pub mod metrics;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod raster;

// Re-exports for convenience
pub use cli::{Cli, Commands, DeblurArgs};
pub use config::{CliOverrides, Config, ConfigError, RunSettings};
pub use deconv::{
    convolve, convolve_with, richardson_lucy, wiener, ConvolutionStrategy, Deadline,
    DeconvError, Executor, IterationObserver, IterationSnapshot, NoopObserver,
    NormalizationPolicy, Psf, RichardsonLucy, RichardsonLucyOptions, WienerFilter,
    WienerOptions,
};
pub use metrics::{mse, psnr, ssim, MetricsError, QualityReport};
pub use pipeline::{DeblurMethod, DeblurPipeline, PipelineConfig, PipelineError, PipelineResult};
pub use postprocess::{
    DenoiseMethod, NlMeansOptions, PostprocessError, PostprocessOptions, UnsharpOptions,
};
pub use progress::{IterationProgress, OutputMode};
pub use raster::{load_image, save_image, FloatImage, RasterError};

/// Process exit codes
pub mod exit_codes {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Invalid command-line arguments
    pub const INVALID_ARGS: i32 = 2;
    /// Input file not found
    pub const INPUT_NOT_FOUND: i32 = 3;
    /// Processing failed
    pub const PROCESSING_ERROR: i32 = 4;
}
