//! Image quality metrics
//!
//! Full-reference comparisons between a restored image and its ground
//! truth: MSE, PSNR and SSIM.
//!
//! # Example
//!
//! ```rust,no_run
//! use rl_deblur::metrics::QualityReport;
//! use rl_deblur::raster::load_image;
//! use std::path::Path;
//!
//! let truth = load_image(Path::new("sharp.png"), true).unwrap();
//! let restored = load_image(Path::new("restored.png"), true).unwrap();
//! let report = QualityReport::compute(&truth, &restored).unwrap();
//! println!("PSNR {:.2} dB, SSIM {:.4}", report.psnr, report.ssim);
//! ```

use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::FloatImage;

// ============================================================
// Constants
// ============================================================

/// SSIM window edge
pub const SSIM_WINDOW: usize = 7;

const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;

/// Data range of images in `[0, 1]`
pub const UNIT_DATA_RANGE: f64 = 1.0;

// ============================================================
// Error Types
// ============================================================

/// Metrics error types
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Shape mismatch: {expected:?} vs {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Image {height}x{width} is smaller than the {window}x{window} SSIM window")]
    ImageTooSmall {
        height: usize,
        width: usize,
        window: usize,
    },

    #[error("Data range must be positive, got {0}")]
    InvalidDataRange(f64),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

fn check_shapes(a: &FloatImage, b: &FloatImage) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(MetricsError::ShapeMismatch {
            expected: a.shape(),
            actual: b.shape(),
        });
    }
    Ok(())
}

fn check_range(data_range: f64) -> Result<()> {
    if !(data_range.is_finite() && data_range > 0.0) {
        return Err(MetricsError::InvalidDataRange(data_range));
    }
    Ok(())
}

// ============================================================
// Metrics
// ============================================================

/// Mean squared error over every sample
pub fn mse(a: &FloatImage, b: &FloatImage) -> Result<f64> {
    check_shapes(a, b)?;
    let sum: f64 = a
        .as_array()
        .iter()
        .zip(b.as_array().iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Ok(sum / a.as_array().len() as f64)
}

/// Peak signal-to-noise ratio in dB, infinite for identical images
pub fn psnr(a: &FloatImage, b: &FloatImage, data_range: f64) -> Result<f64> {
    check_range(data_range)?;
    let err = mse(a, b)?;
    if err == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (data_range * data_range / err).log10())
}

/// Mean structural similarity
///
/// Uses a uniform 7x7 window with sample (unbiased) statistics and averages
/// over the windows that fit entirely inside the image, then over channels.
pub fn ssim(a: &FloatImage, b: &FloatImage, data_range: f64) -> Result<f64> {
    check_range(data_range)?;
    check_shapes(a, b)?;
    let (height, width, channels) = a.shape();
    if height < SSIM_WINDOW || width < SSIM_WINDOW {
        return Err(MetricsError::ImageTooSmall {
            height,
            width,
            window: SSIM_WINDOW,
        });
    }

    let c1 = (SSIM_K1 * data_range).powi(2);
    let c2 = (SSIM_K2 * data_range).powi(2);
    let total: f64 = (0..channels)
        .map(|ch| ssim_plane(&a.channel(ch), &b.channel(ch), c1, c2))
        .sum();
    Ok(total / channels as f64)
}

fn ssim_plane(x: &ArrayView2<f64>, y: &ArrayView2<f64>, c1: f64, c2: f64) -> f64 {
    let (rows, cols) = x.dim();
    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
    let cov_norm = n / (n - 1.0);

    let mut sum = 0.0;
    let mut count = 0usize;
    for r in 0..=rows - SSIM_WINDOW {
        for c in 0..=cols - SSIM_WINDOW {
            let wx = x.slice(s![r..r + SSIM_WINDOW, c..c + SSIM_WINDOW]);
            let wy = y.slice(s![r..r + SSIM_WINDOW, c..c + SSIM_WINDOW]);

            let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for (&p, &q) in wx.iter().zip(wy.iter()) {
                sx += p;
                sy += q;
                sxx += p * p;
                syy += q * q;
                sxy += p * q;
            }
            let (ux, uy) = (sx / n, sy / n);
            let vx = cov_norm * (sxx / n - ux * ux);
            let vy = cov_norm * (syy / n - uy * uy);
            let vxy = cov_norm * (sxy / n - ux * uy);

            sum += ((2.0 * ux * uy + c1) * (2.0 * vxy + c2))
                / ((ux * ux + uy * uy + c1) * (vx + vy + c2));
            count += 1;
        }
    }
    sum / count as f64
}

// ============================================================
// Report
// ============================================================

/// Quality of a restored image against ground truth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Mean squared error
    pub mse: f64,

    /// PSNR in dB (serialized as `null` when infinite)
    pub psnr: f64,

    /// Mean SSIM
    pub ssim: f64,
}

impl QualityReport {
    /// Compare two images with values in `[0, 1]`
    pub fn compute(truth: &FloatImage, restored: &FloatImage) -> Result<Self> {
        Ok(Self {
            mse: mse(truth, restored)?,
            psnr: psnr(truth, restored, UNIT_DATA_RANGE)?,
            ssim: ssim(truth, restored, UNIT_DATA_RANGE)?,
        })
    }
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MSE: {:.6}, PSNR: {:.2} dB, SSIM: {:.4}",
            self.mse, self.psnr, self.ssim
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f64, size: usize) -> FloatImage {
        FloatImage::from_fn(size, size, 1, |_, _, _| value).unwrap()
    }

    fn pattern(size: usize) -> FloatImage {
        FloatImage::from_fn(size, size, 3, |r, c, ch| ((r * 3 + c * 5 + ch) % 11) as f64 / 10.0)
            .unwrap()
    }

    #[test]
    fn test_mse_known_values() {
        assert_eq!(mse(&constant(0.0, 4), &constant(1.0, 4)).unwrap(), 1.0);
        assert_eq!(mse(&pattern(8), &pattern(8)).unwrap(), 0.0);
        assert!((mse(&constant(0.2, 4), &constant(0.5, 4)).unwrap() - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_psnr_known_values() {
        let p = psnr(&constant(0.0, 4), &constant(0.5, 4), 1.0).unwrap();
        assert!((p - 6.020599913279624).abs() < 1e-9);
        assert_eq!(psnr(&pattern(8), &pattern(8), 1.0).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_ssim_identical_is_one() {
        let img = pattern(12);
        assert!((ssim(&img, &img, 1.0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ssim_constant_luminance_term() {
        // Zero variance leaves only the luminance term.
        let s = ssim(&constant(0.2, 9), &constant(0.4, 9), 1.0).unwrap();
        let c1 = 1e-4;
        let expected = (2.0 * 0.2 * 0.4 + c1) / (0.04 + 0.16 + c1);
        assert!((s - expected).abs() < 1e-9, "{s} vs {expected}");
    }

    #[test]
    fn test_ssim_inverted_pattern_is_low() {
        let img = pattern(16);
        let inverted = FloatImage::new(img.as_array().mapv(|v| 1.0 - v)).unwrap();
        assert!(ssim(&img, &inverted, 1.0).unwrap() < 0.0);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            mse(&constant(0.0, 4), &constant(0.0, 5)),
            Err(MetricsError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            ssim(&constant(0.0, 6), &constant(0.0, 6), 1.0),
            Err(MetricsError::ImageTooSmall { .. })
        ));
        assert!(matches!(
            psnr(&constant(0.0, 4), &constant(0.1, 4), 0.0),
            Err(MetricsError::InvalidDataRange(_))
        ));
    }

    #[test]
    fn test_report_json() {
        let truth = pattern(10);
        let restored = FloatImage::new(truth.as_array().mapv(|v| v * 0.9)).unwrap();
        let report = QualityReport::compute(&truth, &restored).unwrap();
        assert!(report.mse > 0.0);
        assert!(report.psnr.is_finite());
        assert!(report.ssim > 0.5 && report.ssim < 1.0);

        let json = serde_json::to_string(&report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["ssim"].as_f64().is_some());
    }
}
