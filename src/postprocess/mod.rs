//! Postprocess module
//!
//! Optional cleanup applied to a deblurred image.
//!
//! # Features
//!
//! - **Median** ([`median_filter`]) - Disk-footprint median, nearest-edge padding
//! - **Non-local means** ([`nl_means`]) - Patch-similarity weighted averaging
//! - **Noise estimate** ([`estimate_sigma`]) - Wavelet-based sigma estimate
//! - **Unsharp mask** ([`unsharp_mask`]) - Edge enhancement
//!
//! # Example
//!
//! ```rust,no_run
//! use rl_deblur::postprocess::{apply, DenoiseMethod, PostprocessOptions, UnsharpOptions};
//! use rl_deblur::raster::load_image;
//! use std::path::Path;
//!
//! let img = load_image(Path::new("deblurred.png"), true).unwrap();
//! let options = PostprocessOptions::builder()
//!     .denoise(DenoiseMethod::Median)
//!     .sharpen(UnsharpOptions::default())
//!     .build();
//! let cleaned = apply(&img, &options).unwrap();
//! ```

mod denoise;
mod sharpen;
mod types;

use tracing::info;

use crate::raster::FloatImage;

// Re-export public API
pub use denoise::{denoise, estimate_sigma, median_filter, nl_means};
pub use sharpen::unsharp_mask;
pub use types::{
    DenoiseMethod, NlMeansOptions, NlMeansOptionsBuilder, PostprocessError, PostprocessOptions,
    PostprocessOptionsBuilder, Result, UnsharpOptions, DEFAULT_H_FACTOR, DEFAULT_MEDIAN_RADIUS,
    DEFAULT_PATCH_DISTANCE, DEFAULT_PATCH_SIZE, DEFAULT_UNSHARP_AMOUNT, DEFAULT_UNSHARP_RADIUS,
};

/// Denoise, then sharpen, as configured
pub fn apply(image: &FloatImage, options: &PostprocessOptions) -> Result<FloatImage> {
    if options.is_noop() {
        return Ok(image.clone());
    }

    let mut result = if options.denoise == DenoiseMethod::None {
        image.clone()
    } else {
        info!("Denoising ({})", options.denoise.name());
        denoise(image, options)?
    };

    if let Some(sharpen) = &options.sharpen {
        info!(
            "Enhancing edges (radius {}, amount {})",
            sharpen.radius, sharpen.amount
        );
        result = unsharp_mask(&result, sharpen)?;
    }

    Ok(result)
}
