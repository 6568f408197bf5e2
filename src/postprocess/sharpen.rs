//! Unsharp masking
//!
//! `out = x + amount · (x - G(x))` with `G` a Gaussian blur whose sigma is
//! the mask radius. The blur replicates edge pixels.

use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use ndarray::Array2;
use tracing::debug;

use super::types::{PostprocessError, Result, UnsharpOptions};
use crate::raster::FloatImage;

/// Sharpen every channel of `image`, clamping the result to `[0, 1]`
///
/// `radius` must be positive and finite, `amount` finite.
pub fn unsharp_mask(image: &FloatImage, options: &UnsharpOptions) -> Result<FloatImage> {
    let UnsharpOptions { radius, amount } = *options;
    // imageproc blurs in f32; the radius must survive the narrowing.
    let sigma = radius as f32;
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(PostprocessError::InvalidParameter(format!(
            "unsharp radius must be positive, got {}",
            radius
        )));
    }
    if !amount.is_finite() {
        return Err(PostprocessError::InvalidParameter(format!(
            "unsharp amount must be finite, got {}",
            amount
        )));
    }
    debug!("Unsharp mask: radius {}, amount {}", radius, amount);

    let planes = image
        .to_channels()
        .iter()
        .map(|plane| {
            let blurred = gaussian_plane(plane, sigma)?;
            Ok(ndarray::Zip::from(plane)
                .and(&blurred)
                .map_collect(|&x, &g| x + amount * (x - g)))
        })
        .collect::<Result<Vec<Array2<f64>>>>()?;

    Ok(FloatImage::from_channels(&planes)?.clamped())
}

/// Gaussian blur of one plane through `imageproc`
fn gaussian_plane(plane: &Array2<f64>, sigma: f32) -> Result<Array2<f64>> {
    let (rows, cols) = plane.dim();
    let raw: Vec<f32> = plane.iter().map(|&v| v as f32).collect();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, raw).ok_or_else(|| {
            PostprocessError::ProcessingFailed("Failed to create blur buffer".to_string())
        })?;

    let blurred = gaussian_blur_f32(&buffer, sigma);
    Array2::from_shape_vec((rows, cols), blurred.into_raw().into_iter().map(f64::from).collect())
        .map_err(|e| PostprocessError::ProcessingFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(lo: f64, hi: f64) -> FloatImage {
        FloatImage::from_fn(12, 12, 1, |_, c, _| if c < 6 { lo } else { hi }).unwrap()
    }

    #[test]
    fn test_constant_image_unchanged() {
        let img = FloatImage::from_fn(9, 9, 3, |_, _, ch| 0.25 * (ch + 1) as f64).unwrap();
        let out = unsharp_mask(&img, &UnsharpOptions::default()).unwrap();
        for (a, b) in img.as_array().iter().zip(out.as_array().iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_edge_contrast_increases() {
        let img = step(0.3, 0.7);
        let out = unsharp_mask(&img, &UnsharpOptions::default()).unwrap();
        let dark = out.as_array()[[6, 5, 0]];
        let bright = out.as_array()[[6, 6, 0]];
        assert!(dark < 0.3, "dark side {dark}");
        assert!(bright > 0.7, "bright side {bright}");
    }

    #[test]
    fn test_output_clamped() {
        let img = step(0.0, 1.0);
        let options = UnsharpOptions {
            radius: 2.0,
            amount: 5.0,
        };
        let out = unsharp_mask(&img, &options).unwrap();
        assert!(out.is_unit_range());
    }

    #[test]
    fn test_zero_amount_is_identity() {
        let img = step(0.2, 0.6);
        let options = UnsharpOptions {
            radius: 1.5,
            amount: 0.0,
        };
        assert_eq!(unsharp_mask(&img, &options).unwrap(), img);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let img = step(0.2, 0.6);
        let zero_radius = UnsharpOptions {
            radius: 0.0,
            amount: 1.0,
        };
        assert!(matches!(
            unsharp_mask(&img, &zero_radius),
            Err(PostprocessError::InvalidParameter(_))
        ));
        let nan_amount = UnsharpOptions {
            radius: 1.0,
            amount: f64::NAN,
        };
        assert!(unsharp_mask(&img, &nan_amount).is_err());
    }

    #[test]
    fn test_rejects_radius_outside_f32_range() {
        let img = step(0.2, 0.6);
        for radius in [1e-50, 1e300] {
            let options = UnsharpOptions {
                radius,
                amount: 1.0,
            };
            assert!(matches!(
                unsharp_mask(&img, &options),
                Err(PostprocessError::InvalidParameter(_))
            ));
        }
    }
}
