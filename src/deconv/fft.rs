//! 2D FFT on row-major complex buffers
//!
//! Rows are transformed in one batched call, columns after a transpose.
//! Plans are created once per image size and shared read-only.

use ndarray::{Array2, ArrayView2};
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Relative bound on the imaginary residual of an inverse transform
const IMAGINARY_RESIDUAL_TOLERANCE: f64 = 1e-9;

/// Frequency-domain plane, row-major
#[derive(Debug, Clone)]
pub(crate) struct Spectrum {
    rows: usize,
    cols: usize,
    data: Vec<Complex64>,
}

impl Spectrum {
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    /// Element-wise product
    pub fn multiply(&mut self, other: &Spectrum) {
        debug_assert_eq!(self.dim(), other.dim());
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a *= *b;
        }
    }
}

/// Planned 2D transform for one image size
pub(crate) struct Fft2d {
    rows: usize,
    cols: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            rows,
            cols,
            row_forward: planner.plan_fft_forward(cols),
            row_inverse: planner.plan_fft_inverse(cols),
            col_forward: planner.plan_fft_forward(rows),
            col_inverse: planner.plan_fft_inverse(rows),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Forward transform of a real plane
    pub fn forward(&self, plane: &ArrayView2<f64>) -> Spectrum {
        debug_assert_eq!(plane.dim(), self.dim());
        let mut data: Vec<Complex64> = plane.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.transform(&mut data, true);
        Spectrum {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Transfer function of a small kernel
    ///
    /// The kernel is zero-padded to the plane size with its anchor
    /// (`size / 2` on each axis) rolled to the origin.
    pub fn kernel_spectrum(&self, kernel: &ArrayView2<f64>) -> Spectrum {
        let (k_rows, k_cols) = kernel.dim();
        let (anchor_r, anchor_c) = ((k_rows / 2) as isize, (k_cols / 2) as isize);
        let mut data = vec![Complex64::new(0.0, 0.0); self.rows * self.cols];

        for ((m, n), &v) in kernel.indexed_iter() {
            let r = (m as isize - anchor_r).rem_euclid(self.rows as isize) as usize;
            let c = (n as isize - anchor_c).rem_euclid(self.cols as isize) as usize;
            data[r * self.cols + c].re += v;
        }

        self.transform(&mut data, true);
        Spectrum {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Inverse transform, keeping the real part
    pub fn inverse_real(&self, mut spectrum: Spectrum) -> Array2<f64> {
        debug_assert_eq!(spectrum.dim(), self.dim());
        self.transform(&mut spectrum.data, false);

        let scale = 1.0 / (self.rows * self.cols) as f64;
        debug_assert!({
            let max_re = spectrum.data.iter().fold(0.0f64, |m, z| m.max(z.re.abs()));
            let max_im = spectrum.data.iter().fold(0.0f64, |m, z| m.max(z.im.abs()));
            max_im <= IMAGINARY_RESIDUAL_TOLERANCE * max_re.max(1.0)
        });

        let data = spectrum.data;
        let cols = self.cols;
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| data[r * cols + c].re * scale)
    }

    fn transform(&self, data: &mut [Complex64], forward: bool) {
        let (row_fft, col_fft) = if forward {
            (&self.row_forward, &self.col_forward)
        } else {
            (&self.row_inverse, &self.col_inverse)
        };

        row_fft.process(data);

        let mut transposed = vec![Complex64::new(0.0, 0.0); data.len()];
        transpose(data, &mut transposed, self.rows, self.cols);
        col_fft.process(&mut transposed);
        transpose(&transposed, data, self.cols, self.rows);
    }
}

/// `src` is `rows`x`cols`, `dst` becomes `cols`x`rows`
fn transpose(src: &[Complex64], dst: &mut [Complex64], rows: usize, cols: usize) {
    for r in 0..rows {
        for c in 0..cols {
            dst[c * rows + r] = src[r * cols + c];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_inverse_roundtrip() {
        let plane = Array2::from_shape_fn((6, 10), |(r, c)| ((r * 7 + c * 3) % 5) as f64 / 4.0);
        let fft = Fft2d::new(6, 10);
        let restored = fft.inverse_real(fft.forward(&plane.view()));
        for (a, b) in plane.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dc_component_is_sum() {
        let plane = Array2::from_elem((4, 4), 0.25);
        let fft = Fft2d::new(4, 4);
        let spectrum = fft.forward(&plane.view());
        assert!((spectrum.as_slice()[0].re - 4.0).abs() < 1e-12);
        assert!(spectrum.as_slice()[1].norm() < 1e-12);
    }

    #[test]
    fn test_delta_kernel_spectrum_is_flat() {
        let kernel = Array2::from_shape_fn((3, 3), |(r, c)| if r == 1 && c == 1 { 1.0 } else { 0.0 });
        let fft = Fft2d::new(8, 5);
        let spectrum = fft.kernel_spectrum(&kernel.view());
        for z in spectrum.as_slice() {
            assert!((z.re - 1.0).abs() < 1e-12);
            assert!(z.im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_transpose() {
        let src: Vec<Complex64> = (0..6).map(|i| Complex64::new(i as f64, 0.0)).collect();
        let mut dst = vec![Complex64::new(0.0, 0.0); 6];
        transpose(&src, &mut dst, 2, 3);
        let re: Vec<f64> = dst.iter().map(|z| z.re).collect();
        assert_eq!(re, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }
}
