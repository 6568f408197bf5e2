//! Deblur pipeline
//!
//! Load, deblur, clean up and save a single image:
//!
//! 1. Load (grayscale unless colour is requested)
//! 2. Build a Gaussian PSF
//! 3. Deblur with Richardson-Lucy or Wiener
//! 4. Optional denoise and unsharp mask
//! 5. Save as `<stem>_<method>.png`
//!
//! # Example
//!
//! ```rust,no_run
//! use rl_deblur::deconv::NoopObserver;
//! use rl_deblur::pipeline::{DeblurPipeline, PipelineConfig};
//! use std::path::Path;
//!
//! let pipeline = DeblurPipeline::new(PipelineConfig::default());
//! let result = pipeline
//!     .process_file(Path::new("blurred.png"), Path::new("data/results"), &mut NoopObserver)
//!     .unwrap();
//! println!("Saved {}", result.output_path.display());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use crate::deconv::{
    ConvolutionStrategy, DeconvError, Executor, IterationObserver, NormalizationPolicy, Psf,
    RichardsonLucy, RichardsonLucyOptions, WienerFilter, WienerOptions, DEFAULT_EPSILON,
    DEFAULT_ITERATIONS, DEFAULT_NORMALIZATION_TOLERANCE, DEFAULT_WIENER_BALANCE,
};
use crate::exit_codes;
use crate::metrics::{MetricsError, QualityReport};
use crate::postprocess::{self, PostprocessError, PostprocessOptions};
use crate::raster::{load_image, save_image, FloatImage, RasterError};

// ============================================================
// Constants
// ============================================================

/// Default PSF edge length
pub const DEFAULT_PSF_SIZE: usize = 5;

/// Default PSF sigma
pub const DEFAULT_PSF_SIGMA: f64 = 1.0;

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "data/results";

// ============================================================
// Error Types
// ============================================================

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Invalid PSF settings: {0}")]
    PsfSettings(#[source] DeconvError),

    #[error("Deconvolution failed: {0}")]
    Deconv(#[from] DeconvError),

    #[error("Postprocess failed: {0}")]
    Postprocess(#[from] PostprocessError),

    #[error("Evaluation failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

impl PipelineError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::InputNotFound(_) | PipelineError::Raster(RasterError::ImageNotFound(_)) => {
                exit_codes::INPUT_NOT_FOUND
            }
            PipelineError::PsfSettings(_) => exit_codes::INVALID_ARGS,
            PipelineError::Deconv(e) if e.is_parameter_error() => exit_codes::INVALID_ARGS,
            PipelineError::Postprocess(PostprocessError::InvalidParameter(_)) => {
                exit_codes::INVALID_ARGS
            }
            _ => exit_codes::PROCESSING_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Configuration
// ============================================================

/// Deblurring algorithm
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DeblurMethod {
    /// Wiener filter
    Wiener,

    /// Richardson-Lucy
    #[default]
    Rl,
}

impl DeblurMethod {
    /// Short name, also used as the output file suffix
    pub fn name(&self) -> &'static str {
        match self {
            DeblurMethod::Wiener => "wiener",
            DeblurMethod::Rl => "rl",
        }
    }
}

/// Resolved pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Deblurring algorithm
    pub method: DeblurMethod,

    /// Gaussian PSF edge length
    pub psf_size: usize,

    /// Gaussian PSF sigma (non-positive derives it from the size)
    pub psf_sigma: f64,

    /// Richardson-Lucy iteration count
    pub iterations: usize,

    /// Richardson-Lucy convolution strategy
    pub strategy: ConvolutionStrategy,

    /// Richardson-Lucy division floor
    pub epsilon: f64,

    /// Wiener regularization weight
    pub balance: f64,

    /// PSF normalization policy
    pub normalization: NormalizationPolicy,

    /// Numeric executor
    pub executor: Executor,

    /// Denoise and sharpen steps
    pub postprocess: PostprocessOptions,

    /// Keep colour channels instead of converting to gray
    pub color: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            method: DeblurMethod::Rl,
            psf_size: DEFAULT_PSF_SIZE,
            psf_sigma: DEFAULT_PSF_SIGMA,
            iterations: DEFAULT_ITERATIONS,
            strategy: ConvolutionStrategy::Spatial,
            epsilon: DEFAULT_EPSILON,
            balance: DEFAULT_WIENER_BALANCE,
            normalization: NormalizationPolicy::Strict,
            executor: Executor::default(),
            postprocess: PostprocessOptions::default(),
            color: false,
        }
    }
}

impl PipelineConfig {
    /// Richardson-Lucy options derived from this config
    pub fn rl_options(&self) -> RichardsonLucyOptions {
        RichardsonLucyOptions::builder()
            .iterations(self.iterations)
            .strategy(self.strategy)
            .executor(self.executor)
            .epsilon(self.epsilon)
            .normalization(self.normalization)
            .normalization_tolerance(DEFAULT_NORMALIZATION_TOLERANCE)
            .build()
    }

    /// Wiener options derived from this config
    pub fn wiener_options(&self) -> WienerOptions {
        WienerOptions {
            balance: self.balance,
            executor: self.executor,
            normalization: self.normalization,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
        }
    }

    /// Set the deblurring method
    #[must_use]
    pub fn with_method(mut self, method: DeblurMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the Richardson-Lucy iteration count
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the executor
    #[must_use]
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Set the postprocess steps
    #[must_use]
    pub fn with_postprocess(mut self, postprocess: PostprocessOptions) -> Self {
        self.postprocess = postprocess;
        self
    }
}

// ============================================================
// Pipeline
// ============================================================

/// Summary of one processed file
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Input image
    pub input_path: PathBuf,

    /// Written image
    pub output_path: PathBuf,

    /// Image height in pixels
    pub height: usize,

    /// Image width in pixels
    pub width: usize,

    /// Channels processed
    pub channels: usize,

    /// Method used
    pub method: DeblurMethod,

    /// Wall-clock processing time
    pub elapsed_seconds: f64,
}

/// Single-image deblurring pipeline
#[derive(Debug, Clone, Default)]
pub struct DeblurPipeline {
    config: PipelineConfig,
}

impl DeblurPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Gaussian PSF from the configured size and sigma
    pub fn build_psf(&self) -> Result<Psf> {
        Psf::gaussian(self.config.psf_size, self.config.psf_sigma)
            .map_err(PipelineError::PsfSettings)
    }

    /// `<output_dir>/<stem>_<method>.png`
    pub fn output_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        output_dir.join(format!("{}_{}.png", stem, self.config.method.name()))
    }

    /// Deblur and postprocess an in-memory image
    ///
    /// `observer` is called between Richardson-Lucy iterations and is not
    /// used by the Wiener filter.
    pub fn restore(
        &self,
        image: &FloatImage,
        observer: &mut dyn IterationObserver,
    ) -> Result<FloatImage> {
        let psf = self.build_psf()?;
        info!(
            "Deblurring with {} (PSF {}x{}, sigma {})",
            self.config.method.name(),
            psf.size(),
            psf.size(),
            self.config.psf_sigma
        );

        let deblurred = match self.config.method {
            DeblurMethod::Rl => RichardsonLucy::new(self.config.rl_options())
                .deblur_with_observer(image, &psf, observer)?,
            DeblurMethod::Wiener => {
                WienerFilter::new(self.config.wiener_options()).deblur(image, &psf)?
            }
        };

        Ok(postprocess::apply(&deblurred, &self.config.postprocess)?)
    }

    /// Load `input`, restore it and save into `output_dir`
    pub fn process_file(
        &self,
        input: &Path,
        output_dir: &Path,
        observer: &mut dyn IterationObserver,
    ) -> Result<PipelineResult> {
        let (_, result) = self.process_file_with_image(input, output_dir, observer)?;
        Ok(result)
    }

    /// [`DeblurPipeline::process_file`], also returning the restored image
    pub fn process_file_with_image(
        &self,
        input: &Path,
        output_dir: &Path,
        observer: &mut dyn IterationObserver,
    ) -> Result<(FloatImage, PipelineResult)> {
        let start = Instant::now();
        if !input.exists() {
            return Err(PipelineError::InputNotFound(input.to_path_buf()));
        }

        info!("Loading {}", input.display());
        let image = load_image(input, !self.config.color)?;
        let restored = self.restore(&image, observer)?;

        let output_path = self.output_path(input, output_dir);
        info!("Saving {}", output_path.display());
        save_image(&restored, &output_path)?;

        let (height, width, channels) = restored.shape();
        let result = PipelineResult {
            input_path: input.to_path_buf(),
            output_path,
            height,
            width,
            channels,
            method: self.config.method,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };
        Ok((restored, result))
    }

    /// Compare a restored image with ground truth loaded from `gt_path`
    pub fn evaluate(&self, restored: &FloatImage, gt_path: &Path) -> Result<QualityReport> {
        if !gt_path.exists() {
            return Err(PipelineError::InputNotFound(gt_path.to_path_buf()));
        }
        let truth = load_image(gt_path, !self.config.color)?;
        Ok(QualityReport::compute(&truth, restored)?)
    }
}
