//! Floating-point image buffer and raster error types

use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================
// Error Types
// ============================================================

/// Raster error types
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Invalid dimensions: {height}x{width}x{channels}")]
    InvalidDimensions {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("Channel planes have mismatched shapes")]
    ChannelMismatch,

    #[error("Unsupported channel count for encoding: {0}")]
    UnsupportedChannels(usize),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RasterError>;

// ============================================================
// FloatImage
// ============================================================

/// Image stored as a `(height, width, channels)` array of `f64`
///
/// Values are expected in `[0, 1]` at pipeline boundaries. Intermediate
/// results (for example a Richardson-Lucy estimate) may leave that range.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    data: Array3<f64>,
}

impl FloatImage {
    /// Wrap an existing array. Every dimension must be non-zero.
    pub fn new(data: Array3<f64>) -> Result<Self> {
        let (height, width, channels) = data.dim();
        if height == 0 || width == 0 || channels == 0 {
            return Err(RasterError::InvalidDimensions {
                height,
                width,
                channels,
            });
        }
        Ok(Self { data })
    }

    /// Image filled with zeros
    pub fn zeros(height: usize, width: usize, channels: usize) -> Result<Self> {
        Self::new(Array3::zeros((height, width, channels)))
    }

    /// Build an image by evaluating `f(row, col, channel)` for every sample
    pub fn from_fn<F>(height: usize, width: usize, channels: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize, usize) -> f64,
    {
        Self::new(Array3::from_shape_fn((height, width, channels), |(r, c, ch)| {
            f(r, c, ch)
        }))
    }

    /// Stack channel planes into one image
    pub fn from_channels(planes: &[Array2<f64>]) -> Result<Self> {
        let first = planes.first().ok_or(RasterError::InvalidDimensions {
            height: 0,
            width: 0,
            channels: 0,
        })?;
        let (height, width) = first.dim();
        if planes.iter().any(|p| p.dim() != (height, width)) {
            return Err(RasterError::ChannelMismatch);
        }

        let mut data = Array3::zeros((height, width, planes.len()));
        for (ch, plane) in planes.iter().enumerate() {
            data.index_axis_mut(Axis(2), ch).assign(plane);
        }
        Self::new(data)
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }

    /// View of one channel plane
    ///
    /// # Panics
    ///
    /// Panics if `channel >= self.channels()`.
    pub fn channel(&self, channel: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(2), channel)
    }

    /// Owned copies of every channel plane, in standard layout
    pub fn to_channels(&self) -> Vec<Array2<f64>> {
        self.data
            .axis_iter(Axis(2))
            .map(|plane| plane.to_owned())
            .collect()
    }

    /// Clamp every sample to `[0, 1]`
    pub fn clamp_unit(&mut self) {
        self.data.mapv_inplace(|v| v.clamp(0.0, 1.0));
    }

    /// Consuming variant of [`FloatImage::clamp_unit`]
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.clamp_unit();
        self
    }

    pub fn is_unit_range(&self) -> bool {
        self.data.iter().all(|&v| (0.0..=1.0).contains(&v))
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimension_rejected() {
        let result = FloatImage::zeros(0, 4, 1);
        assert!(matches!(
            result,
            Err(RasterError::InvalidDimensions { height: 0, .. })
        ));
    }

    #[test]
    fn test_channels_roundtrip() {
        let img = FloatImage::from_fn(4, 5, 3, |r, c, ch| (r * 100 + c * 10 + ch) as f64).unwrap();
        let planes = img.to_channels();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[2][[3, 4]], 342.0);

        let rebuilt = FloatImage::from_channels(&planes).unwrap();
        assert_eq!(rebuilt, img);
    }

    #[test]
    fn test_channel_mismatch() {
        let planes = vec![Array2::zeros((3, 3)), Array2::zeros((3, 4))];
        assert!(matches!(
            FloatImage::from_channels(&planes),
            Err(RasterError::ChannelMismatch)
        ));
    }

    #[test]
    fn test_clamp_unit() {
        let img = FloatImage::from_fn(2, 2, 1, |r, c, _| (r as f64) * 2.0 - (c as f64)).unwrap();
        assert!(!img.is_unit_range());
        let clamped = img.clamped();
        assert!(clamped.is_unit_range());
        assert_eq!(clamped.as_array()[[0, 1, 0]], 0.0);
        assert_eq!(clamped.as_array()[[1, 0, 0]], 1.0);
    }
}
