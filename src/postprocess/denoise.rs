//! Denoising filters
//!
//! Median filtering over a disk and non-local means, plus a robust noise
//! estimate used to pick the NL-means strength.

use ndarray::{Array2, Array3, ArrayView2, Zip};
use rayon::prelude::*;
use tracing::debug;

use super::types::{
    DenoiseMethod, NlMeansOptions, PostprocessError, PostprocessOptions, Result, DEFAULT_H_FACTOR,
};
use crate::raster::FloatImage;

/// Median absolute deviation of a unit Gaussian
const MAD_TO_SIGMA: f64 = 0.6745;

// ============================================================
// Dispatch
// ============================================================

/// Apply the configured denoising method
pub fn denoise(image: &FloatImage, options: &PostprocessOptions) -> Result<FloatImage> {
    match options.denoise {
        DenoiseMethod::None => Ok(image.clone()),
        DenoiseMethod::Median => median_filter(image, options.median_radius),
        DenoiseMethod::NlMeans => nl_means(image, &options.nl_means),
    }
}

// ============================================================
// Median
// ============================================================

/// Offsets `(dy, dx)` with `dy² + dx² ≤ radius²`
fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dy * dy + dx * dx <= r * r {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

/// Median over a disk footprint, per channel
///
/// Samples outside the image take the value of the nearest edge pixel.
/// `radius == 0` returns the input unchanged.
pub fn median_filter(image: &FloatImage, radius: usize) -> Result<FloatImage> {
    if radius == 0 {
        return Ok(image.clone());
    }
    let offsets = disk_offsets(radius);
    debug!("Median filter: radius {}, {} taps", radius, offsets.len());

    let planes: Vec<Array2<f64>> = image
        .to_channels()
        .iter()
        .map(|plane| median_plane(&plane.view(), &offsets))
        .collect();
    Ok(FloatImage::from_channels(&planes)?.clamped())
}

fn median_plane(plane: &ArrayView2<f64>, offsets: &[(isize, isize)]) -> Array2<f64> {
    let (rows, cols) = plane.dim();
    let mut output = Array2::zeros((rows, cols));

    Zip::indexed(&mut output).par_for_each(|(r, c), out| {
        let mut window: Vec<f64> = offsets
            .iter()
            .map(|&(dy, dx)| {
                let y = (r as isize + dy).clamp(0, rows as isize - 1) as usize;
                let x = (c as isize + dx).clamp(0, cols as isize - 1) as usize;
                plane[[y, x]]
            })
            .collect();
        let mid = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable_by(mid, f64::total_cmp);
        *out = *median;
    });
    output
}

// ============================================================
// Noise Estimation
// ============================================================

/// Robust estimate of additive Gaussian noise sigma
///
/// Median absolute value of the diagonal (HH) Haar wavelet coefficients
/// over non-overlapping 2x2 blocks, divided by 0.6745, averaged over
/// channels. Images smaller than 2x2 yield 0.
pub fn estimate_sigma(image: &FloatImage) -> f64 {
    let (rows, cols, channels) = image.shape();
    if rows < 2 || cols < 2 {
        return 0.0;
    }

    let total: f64 = (0..channels)
        .map(|ch| {
            let plane = image.channel(ch);
            let mut detail: Vec<f64> = Vec::with_capacity((rows / 2) * (cols / 2));
            for r in (0..rows - 1).step_by(2) {
                for c in (0..cols - 1).step_by(2) {
                    let hh = (plane[[r, c]] - plane[[r, c + 1]] - plane[[r + 1, c]]
                        + plane[[r + 1, c + 1]])
                        / 2.0;
                    detail.push(hh.abs());
                }
            }
            median(&mut detail) / MAD_TO_SIGMA
        })
        .sum();

    total / channels as f64
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

// ============================================================
// Non-local Means
// ============================================================

/// Mirror an index into `0..len` without repeating the edge sample
fn reflect(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = index.rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Non-local means denoising
///
/// Each output pixel is a weighted mean of the pixels in a
/// `(2 · patch_distance + 1)²` search window. The weight of a candidate is
/// `exp(-d² / h²)`, where `d²` is the mean squared difference between the
/// patches around the two pixels taken over all channels. Patches extend
/// past the border by reflection. When `h` resolves to a value `≤ 0`
/// (for example a noise-free image) the input is returned unchanged.
pub fn nl_means(image: &FloatImage, options: &NlMeansOptions) -> Result<FloatImage> {
    if options.patch_size == 0 {
        return Err(PostprocessError::InvalidParameter(
            "patch size must be positive".to_string(),
        ));
    }
    let h = match options.h {
        Some(h) if !h.is_finite() => {
            return Err(PostprocessError::InvalidParameter(format!(
                "h must be finite, got {}",
                h
            )))
        }
        Some(h) => h,
        None => DEFAULT_H_FACTOR * estimate_sigma(image),
    };
    if h <= 0.0 {
        debug!("NL-means skipped: h = {}", h);
        return Ok(image.clone());
    }

    let (rows, cols, channels) = image.shape();
    let half_patch = (options.patch_size / 2) as isize;
    let search = options.patch_distance as isize;
    let data = image.as_array();
    let patch_len = ((2 * half_patch + 1).pow(2) as usize * channels) as f64;
    let h2 = h * h;

    debug!(
        "NL-means: patch {}, distance {}, h {:.5}",
        2 * half_patch + 1,
        search,
        h
    );

    let sample = |r: isize, c: isize, ch: usize| data[[reflect(r, rows), reflect(c, cols), ch]];

    let patch_distance = |r0: isize, c0: isize, r1: isize, c1: isize| -> f64 {
        let mut sum = 0.0;
        for dy in -half_patch..=half_patch {
            for dx in -half_patch..=half_patch {
                for ch in 0..channels {
                    let d = sample(r0 + dy, c0 + dx, ch) - sample(r1 + dy, c1 + dx, ch);
                    sum += d * d;
                }
            }
        }
        sum / patch_len
    };

    let filtered: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|r| {
            let mut row = vec![0.0; cols * channels];
            let mut acc = vec![0.0; channels];
            for c in 0..cols {
                let (ri, ci) = (r as isize, c as isize);
                acc.iter_mut().for_each(|a| *a = 0.0);
                let mut weight_sum = 0.0;

                let r_lo = (ri - search).max(0);
                let r_hi = (ri + search).min(rows as isize - 1);
                let c_lo = (ci - search).max(0);
                let c_hi = (ci + search).min(cols as isize - 1);
                for rr in r_lo..=r_hi {
                    for cc in c_lo..=c_hi {
                        let weight = (-patch_distance(ri, ci, rr, cc) / h2).exp();
                        weight_sum += weight;
                        for (ch, a) in acc.iter_mut().enumerate() {
                            *a += weight * data[[rr as usize, cc as usize, ch]];
                        }
                    }
                }

                for (ch, a) in acc.iter().enumerate() {
                    row[c * channels + ch] = a / weight_sum;
                }
            }
            row
        })
        .collect();

    let array = Array3::from_shape_vec((rows, cols, channels), filtered)
        .map_err(|e| PostprocessError::ProcessingFailed(e.to_string()))?;
    Ok(FloatImage::new(array)?.clamped())
}
