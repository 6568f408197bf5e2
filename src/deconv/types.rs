//! Deconvolution core types
//!
//! Errors, strategy enums and option structs shared by the convolution
//! engine, the Richardson-Lucy estimator and the Wiener filter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::RasterError;

// ============================================================
// Constants
// ============================================================

/// Default Richardson-Lucy iteration count
pub const DEFAULT_ITERATIONS: usize = 30;

/// Floor applied to the re-blurred estimate before division
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Allowed deviation of the PSF sum from 1.0
pub const DEFAULT_NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Default Wiener balance (noise-to-signal ratio)
pub const DEFAULT_WIENER_BALANCE: f64 = 0.01;

// ============================================================
// Error Types
// ============================================================

/// Deconvolution error types
#[derive(Debug, Error)]
pub enum DeconvError {
    #[error(
        "Kernel {kernel_rows}x{kernel_cols} exceeds image {image_rows}x{image_cols}"
    )]
    KernelTooLarge {
        kernel_rows: usize,
        kernel_cols: usize,
        image_rows: usize,
        image_cols: usize,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Invalid PSF: {0}")]
    InvalidPsf(String),

    #[error("PSF is not normalized: sum = {sum}")]
    PsfNotNormalized { sum: f64 },

    #[error("Iteration count must be positive, got {0}")]
    InvalidIterations(usize),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Deconvolution cancelled after {completed} of {requested} iterations")]
    Cancelled { completed: usize, requested: usize },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
}

impl DeconvError {
    /// Kernel or image dimensions are invalid or incompatible
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::KernelTooLarge { .. }
                | Self::ShapeMismatch { .. }
                | Self::InvalidPsf(_)
                | Self::Raster(RasterError::InvalidDimensions { .. })
        )
    }

    /// A parameter was rejected before any computation ran
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            Self::PsfNotNormalized { .. } | Self::InvalidIterations(_) | Self::InvalidParameter(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeconvError>;

// ============================================================
// Strategy / Policy Enums
// ============================================================

/// Convolution implementation
///
/// The two strategies agree on interior pixels but not at the borders:
///
/// - `Spatial` treats samples outside the image as zero.
/// - `Frequency` multiplies FFT spectra, which wraps around the edges
///   (circular convolution).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ConvolutionStrategy {
    /// Direct sliding-window sum, zero padding
    #[default]
    Spatial,

    /// FFT multiplication, circular boundary
    Frequency,
}

impl ConvolutionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ConvolutionStrategy::Spatial => "spatial",
            ConvolutionStrategy::Frequency => "frequency",
        }
    }

    /// Boundary handling of this strategy
    pub fn boundary(&self) -> &'static str {
        match self {
            ConvolutionStrategy::Spatial => "zero padding",
            ConvolutionStrategy::Frequency => "circular wrap",
        }
    }
}

/// How a PSF whose entries do not sum to 1 is handled
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationPolicy {
    /// Reject with [`DeconvError::PsfNotNormalized`]
    #[default]
    Strict,

    /// Divide by the sum before use
    Renormalize,

    /// Use the kernel as given
    Assume,
}

/// Numeric executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    /// Everything on the calling thread
    Sequential,

    /// Channels and spatial rows on rayon workers
    ///
    /// `threads: None` uses the global pool, `Some(n)` a dedicated pool.
    Parallel { threads: Option<usize> },
}

impl Default for Executor {
    fn default() -> Self {
        Executor::Parallel { threads: None }
    }
}

impl Executor {
    pub fn is_parallel(&self) -> bool {
        matches!(self, Executor::Parallel { .. })
    }

    /// Run `f` under this executor
    ///
    /// A dedicated pool is built per call when a thread count is given.
    pub(crate) fn install<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match self {
            Executor::Parallel {
                threads: Some(threads),
            } => {
                if *threads == 0 {
                    return Err(DeconvError::InvalidParameter(
                        "thread count must be positive".to_string(),
                    ));
                }
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| DeconvError::ThreadPool(e.to_string()))?;
                Ok(pool.install(f))
            }
            _ => Ok(f()),
        }
    }
}

// ============================================================
// Richardson-Lucy Options
// ============================================================

/// Options for Richardson-Lucy deconvolution
#[derive(Debug, Clone)]
pub struct RichardsonLucyOptions {
    /// Number of update steps
    pub iterations: usize,

    /// Convolution implementation
    pub strategy: ConvolutionStrategy,

    /// Numeric executor
    pub executor: Executor,

    /// Floor for the re-blurred estimate
    pub epsilon: f64,

    /// PSF normalization handling
    pub normalization: NormalizationPolicy,

    /// Tolerance for the normalization check
    pub normalization_tolerance: f64,
}

impl Default for RichardsonLucyOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            strategy: ConvolutionStrategy::Spatial,
            executor: Executor::default(),
            epsilon: DEFAULT_EPSILON,
            normalization: NormalizationPolicy::Strict,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
        }
    }
}

impl RichardsonLucyOptions {
    /// Create a builder
    pub fn builder() -> RichardsonLucyOptionsBuilder {
        RichardsonLucyOptionsBuilder::default()
    }

    /// FFT-based convolution, suited to large kernels
    pub fn frequency() -> Self {
        Self {
            strategy: ConvolutionStrategy::Frequency,
            ..Default::default()
        }
    }

    /// Single-threaded run
    pub fn sequential() -> Self {
        Self {
            executor: Executor::Sequential,
            ..Default::default()
        }
    }
}

/// Builder for RichardsonLucyOptions
#[derive(Debug, Default)]
pub struct RichardsonLucyOptionsBuilder {
    options: RichardsonLucyOptions,
}

impl RichardsonLucyOptionsBuilder {
    /// Set iteration count (validated when the run starts)
    #[must_use]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.options.iterations = iterations;
        self
    }

    /// Set convolution strategy
    #[must_use]
    pub fn strategy(mut self, strategy: ConvolutionStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// Set executor
    #[must_use]
    pub fn executor(mut self, executor: Executor) -> Self {
        self.options.executor = executor;
        self
    }

    /// Set division floor
    #[must_use]
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.options.epsilon = epsilon;
        self
    }

    /// Set PSF normalization policy
    #[must_use]
    pub fn normalization(mut self, policy: NormalizationPolicy) -> Self {
        self.options.normalization = policy;
        self
    }

    /// Set normalization tolerance
    #[must_use]
    pub fn normalization_tolerance(mut self, tolerance: f64) -> Self {
        self.options.normalization_tolerance = tolerance.abs();
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> RichardsonLucyOptions {
        self.options
    }
}

// ============================================================
// Wiener Options
// ============================================================

/// Options for Wiener deconvolution
#[derive(Debug, Clone)]
pub struct WienerOptions {
    /// Regularization weight
    pub balance: f64,

    /// Numeric executor
    pub executor: Executor,

    /// PSF normalization handling
    pub normalization: NormalizationPolicy,

    /// Tolerance for the normalization check
    pub normalization_tolerance: f64,
}

impl Default for WienerOptions {
    fn default() -> Self {
        Self {
            balance: DEFAULT_WIENER_BALANCE,
            executor: Executor::default(),
            normalization: NormalizationPolicy::Strict,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
        }
    }
}

impl WienerOptions {
    /// Options with the given balance
    pub fn with_balance(balance: f64) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }
}
