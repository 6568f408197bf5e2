//! Image file loading and saving
//!
//! Decoding goes through the `image` crate, so any format it supports can be
//! read. Samples are normalised to `[0, 1]`. Saving writes 8-bit gray or RGB.

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::Array3;
use std::path::Path;
use tracing::debug;

use super::types::{FloatImage, RasterError, Result};

/// Scale from `[0, 1]` to 8-bit samples
const U8_SCALE: f64 = 255.0;

/// Load an image file as a [`FloatImage`]
///
/// With `as_gray` the result has a single luminance channel, otherwise
/// three RGB channels (alpha is dropped).
pub fn load_image(path: &Path, as_gray: bool) -> Result<FloatImage> {
    if !path.exists() {
        return Err(RasterError::ImageNotFound(path.to_path_buf()));
    }

    let img = image::open(path)?;
    debug!(
        "Loaded {} ({}x{}, {:?})",
        path.display(),
        img.width(),
        img.height(),
        img.color()
    );

    from_dynamic(&img, as_gray)
}

/// Convert a decoded image into a [`FloatImage`]
pub fn from_dynamic(img: &DynamicImage, as_gray: bool) -> Result<FloatImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;

    if as_gray {
        let luma = img.to_luma32f();
        let samples = luma.into_raw();
        let data = Array3::from_shape_fn((height, width, 1), |(r, c, _)| {
            samples[r * width + c] as f64
        });
        FloatImage::new(data)
    } else {
        let rgb = img.to_rgb32f();
        let samples = rgb.into_raw();
        let data = Array3::from_shape_fn((height, width, 3), |(r, c, ch)| {
            samples[(r * width + c) * 3 + ch] as f64
        });
        FloatImage::new(data)
    }
}

/// Convert a [`FloatImage`] into an 8-bit image
///
/// Samples are clamped to `[0, 1]`, scaled by 255 and truncated.
pub fn to_dynamic(img: &FloatImage) -> Result<DynamicImage> {
    let (height, width, channels) = img.shape();
    let data = img.as_array();
    let quantize = |v: f64| (v * U8_SCALE).clamp(0.0, U8_SCALE) as u8;

    match channels {
        1 => {
            let gray = GrayImage::from_fn(width as u32, height as u32, |x, y| {
                image::Luma([quantize(data[[y as usize, x as usize, 0]])])
            });
            Ok(DynamicImage::ImageLuma8(gray))
        }
        3 => {
            let rgb = RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let (r, c) = (y as usize, x as usize);
                image::Rgb([
                    quantize(data[[r, c, 0]]),
                    quantize(data[[r, c, 1]]),
                    quantize(data[[r, c, 2]]),
                ])
            });
            Ok(DynamicImage::ImageRgb8(rgb))
        }
        other => Err(RasterError::UnsupportedChannels(other)),
    }
}

/// Save a [`FloatImage`] to `path`; the format follows the file extension
pub fn save_image(img: &FloatImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    to_dynamic(img)?.save(path)?;
    debug!("Saved {}", path.display());
    Ok(())
}
