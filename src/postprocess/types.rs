//! Common types for the postprocess module

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::RasterError;

// ============================================================
// Constants
// ============================================================

/// Default median filter radius
pub const DEFAULT_MEDIAN_RADIUS: usize = 1;

/// Default NL-means patch edge
pub const DEFAULT_PATCH_SIZE: usize = 5;

/// Default NL-means search radius
pub const DEFAULT_PATCH_DISTANCE: usize = 6;

/// Multiplier applied to the estimated noise sigma when `h` is not given
pub const DEFAULT_H_FACTOR: f64 = 1.15;

/// Default unsharp mask radius (Gaussian sigma)
pub const DEFAULT_UNSHARP_RADIUS: f64 = 1.0;

/// Default unsharp mask amount
pub const DEFAULT_UNSHARP_AMOUNT: f64 = 1.0;

// ============================================================
// Error Types
// ============================================================

/// Postprocess error types
#[derive(Debug, Error)]
pub enum PostprocessError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
}

pub type Result<T> = std::result::Result<T, PostprocessError>;

// ============================================================
// Denoise Options
// ============================================================

/// Denoising step applied after deblurring
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DenoiseMethod {
    /// No denoising
    #[default]
    None,

    /// Median over a disk footprint
    Median,

    /// Non-local means
    NlMeans,
}

impl DenoiseMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DenoiseMethod::None => "none",
            DenoiseMethod::Median => "median",
            DenoiseMethod::NlMeans => "nl-means",
        }
    }
}

/// Options for non-local means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlMeansOptions {
    /// Patch edge length (even sizes round up to the next odd size)
    pub patch_size: usize,

    /// Search radius around each pixel
    pub patch_distance: usize,

    /// Filtering strength; estimated from the image when `None`
    pub h: Option<f64>,
}

impl Default for NlMeansOptions {
    fn default() -> Self {
        Self {
            patch_size: DEFAULT_PATCH_SIZE,
            patch_distance: DEFAULT_PATCH_DISTANCE,
            h: None,
        }
    }
}

impl NlMeansOptions {
    /// Create a builder
    pub fn builder() -> NlMeansOptionsBuilder {
        NlMeansOptionsBuilder::default()
    }
}

/// Builder for NlMeansOptions
#[derive(Debug, Default)]
pub struct NlMeansOptionsBuilder {
    options: NlMeansOptions,
}

impl NlMeansOptionsBuilder {
    /// Set patch size
    #[must_use]
    pub fn patch_size(mut self, size: usize) -> Self {
        self.options.patch_size = size;
        self
    }

    /// Set search radius
    #[must_use]
    pub fn patch_distance(mut self, distance: usize) -> Self {
        self.options.patch_distance = distance;
        self
    }

    /// Set filtering strength
    #[must_use]
    pub fn h(mut self, h: f64) -> Self {
        self.options.h = Some(h);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> NlMeansOptions {
        self.options
    }
}

// ============================================================
// Sharpen Options
// ============================================================

/// Unsharp mask parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsharpOptions {
    /// Gaussian sigma of the blurred copy
    pub radius: f64,

    /// Weight of the detail layer
    pub amount: f64,
}

impl Default for UnsharpOptions {
    fn default() -> Self {
        Self {
            radius: DEFAULT_UNSHARP_RADIUS,
            amount: DEFAULT_UNSHARP_AMOUNT,
        }
    }
}

// ============================================================
// Postprocess Options
// ============================================================

/// Steps run after deblurring, in order: denoise, then sharpen
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessOptions {
    /// Denoising method
    pub denoise: DenoiseMethod,

    /// Median radius, used with [`DenoiseMethod::Median`]
    pub median_radius: usize,

    /// NL-means parameters, used with [`DenoiseMethod::NlMeans`]
    pub nl_means: NlMeansOptions,

    /// Unsharp mask, skipped when `None`
    pub sharpen: Option<UnsharpOptions>,
}

impl Default for PostprocessOptions {
    fn default() -> Self {
        Self {
            denoise: DenoiseMethod::None,
            median_radius: DEFAULT_MEDIAN_RADIUS,
            nl_means: NlMeansOptions::default(),
            sharpen: None,
        }
    }
}

impl PostprocessOptions {
    /// Create a builder
    pub fn builder() -> PostprocessOptionsBuilder {
        PostprocessOptionsBuilder::default()
    }

    /// Nothing to do
    pub fn is_noop(&self) -> bool {
        self.denoise == DenoiseMethod::None && self.sharpen.is_none()
    }
}

/// Builder for PostprocessOptions
#[derive(Debug, Default)]
pub struct PostprocessOptionsBuilder {
    options: PostprocessOptions,
}

impl PostprocessOptionsBuilder {
    /// Set denoising method
    #[must_use]
    pub fn denoise(mut self, method: DenoiseMethod) -> Self {
        self.options.denoise = method;
        self
    }

    /// Set median radius
    #[must_use]
    pub fn median_radius(mut self, radius: usize) -> Self {
        self.options.median_radius = radius;
        self
    }

    /// Set NL-means parameters
    #[must_use]
    pub fn nl_means(mut self, options: NlMeansOptions) -> Self {
        self.options.nl_means = options;
        self
    }

    /// Enable unsharp masking
    #[must_use]
    pub fn sharpen(mut self, options: UnsharpOptions) -> Self {
        self.options.sharpen = Some(options);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> PostprocessOptions {
        self.options
    }
}
