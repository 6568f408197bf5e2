//! Richardson-Lucy deconvolution
//!
//! Multiplicative fixed-point update under the forward model `B ≈ K ⊛ X`:
//!
//! ```text
//! estimate₀ = B
//! repeat N times:
//!     reblurred  = max(estimate ⊛ K, ε)
//!     correction = (B / reblurred) ⊛ flip(K)
//!     estimate   = estimate · correction
//! output = clamp(estimate, 0, 1)
//! ```
//!
//! Exactly `N` steps run; there is no convergence test. Iterations are
//! sequential, while the channels of one iteration are updated in parallel
//! (each worker owns one channel plane). Results are bit-identical across
//! executors for a given strategy. With the frequency strategy
//! the last bits can differ between FFT backends or CPU feature sets.

use ndarray::{Array2, Zip};
use rayon::prelude::*;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::convolve::{check_kernel_fits, stack_channels, Convolver};
use super::psf::Psf;
use super::types::{DeconvError, Result, RichardsonLucyOptions};
use crate::raster::FloatImage;

// ============================================================
// Iteration Observers
// ============================================================

/// State handed to an [`IterationObserver`] after each completed step
pub struct IterationSnapshot<'a> {
    completed: usize,
    total: usize,
    shape: (usize, usize, usize),
    channels: &'a [Array2<f64>],
}

impl IterationSnapshot<'_> {
    /// Steps finished so far (1-based)
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Steps requested for this run
    pub fn total(&self) -> usize {
        self.total
    }

    /// Unclamped estimate, one plane per channel
    pub fn channels(&self) -> &[Array2<f64>] {
        self.channels
    }

    /// Current estimate as an image clamped to `[0, 1]`
    pub fn to_image(&self) -> Result<FloatImage> {
        Ok(stack_channels(self.channels, self.shape)?.clamped())
    }
}

/// Hook called between iterations
///
/// This is the only cancellation point: returning `ControlFlow::Break`
/// aborts the run with [`DeconvError::Cancelled`].
pub trait IterationObserver: Send {
    fn on_iteration(&mut self, snapshot: &IterationSnapshot<'_>) -> ControlFlow<()>;
}

impl<F> IterationObserver for F
where
    F: FnMut(&IterationSnapshot<'_>) -> ControlFlow<()> + Send,
{
    fn on_iteration(&mut self, snapshot: &IterationSnapshot<'_>) -> ControlFlow<()> {
        self(snapshot)
    }
}

/// Observer that never interrupts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IterationObserver for NoopObserver {
    fn on_iteration(&mut self, _snapshot: &IterationSnapshot<'_>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Wall-clock budget checked after each iteration
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    budget: Duration,
    started: Instant,
}

impl Deadline {
    /// Budget starting now
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            started: Instant::now(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }
}

impl IterationObserver for Deadline {
    fn on_iteration(&mut self, snapshot: &IterationSnapshot<'_>) -> ControlFlow<()> {
        if self.is_expired() {
            warn!(
                "Time budget of {:.2}s exhausted after {}/{} iterations",
                self.budget.as_secs_f64(),
                snapshot.completed(),
                snapshot.total()
            );
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

// ============================================================
// Estimator
// ============================================================

/// Richardson-Lucy estimator
#[derive(Debug, Clone, Default)]
pub struct RichardsonLucy {
    options: RichardsonLucyOptions,
}

impl RichardsonLucy {
    pub fn new(options: RichardsonLucyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RichardsonLucyOptions {
        &self.options
    }

    /// Deblur `blurred` with `psf`, returning a clamped estimate
    pub fn deblur(&self, blurred: &FloatImage, psf: &Psf) -> Result<FloatImage> {
        self.deblur_with_observer(blurred, psf, &mut NoopObserver)
    }

    /// [`RichardsonLucy::deblur`] with a per-iteration observer
    pub fn deblur_with_observer(
        &self,
        blurred: &FloatImage,
        psf: &Psf,
        observer: &mut dyn IterationObserver,
    ) -> Result<FloatImage> {
        let estimate = self.run(blurred, blurred, psf, self.options.iterations, observer)?;
        Ok(estimate.clamped())
    }

    /// Run `iterations` steps starting from `initial`
    ///
    /// The estimate is returned without the final clamp, so runs compose:
    /// continuing a result for one more step equals running one step more
    /// from scratch.
    pub fn iterate(
        &self,
        blurred: &FloatImage,
        initial: &FloatImage,
        psf: &Psf,
        iterations: usize,
    ) -> Result<FloatImage> {
        self.run(blurred, initial, psf, iterations, &mut NoopObserver)
    }

    /// Check every input before any work is done
    fn validate(
        &self,
        blurred: &FloatImage,
        initial: &FloatImage,
        psf: &Psf,
        iterations: usize,
    ) -> Result<Psf> {
        if iterations == 0 {
            return Err(DeconvError::InvalidIterations(iterations));
        }
        let epsilon = self.options.epsilon;
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(DeconvError::InvalidParameter(format!(
                "epsilon must be positive and finite, got {}",
                epsilon
            )));
        }
        if initial.shape() != blurred.shape() {
            return Err(DeconvError::ShapeMismatch {
                expected: blurred.shape(),
                actual: initial.shape(),
            });
        }
        check_kernel_fits(psf, blurred.height(), blurred.width())?;
        if !blurred.all_finite() || !initial.all_finite() {
            return Err(DeconvError::InvalidParameter(
                "image contains non-finite samples".to_string(),
            ));
        }

        psf.conform(
            self.options.normalization,
            self.options.normalization_tolerance,
        )
    }

    fn run(
        &self,
        blurred: &FloatImage,
        initial: &FloatImage,
        psf: &Psf,
        iterations: usize,
        observer: &mut dyn IterationObserver,
    ) -> Result<FloatImage> {
        let psf = self.validate(blurred, initial, psf, iterations)?;
        let shape = blurred.shape();
        let (rows, cols, channels) = shape;
        let executor = self.options.executor;
        let parallel = executor.is_parallel();
        let epsilon = self.options.epsilon;

        info!(
            "Richardson-Lucy: {}x{}x{}, kernel {}, {} iterations, {} convolution ({})",
            rows,
            cols,
            channels,
            psf.size(),
            iterations,
            self.options.strategy.name(),
            self.options.strategy.boundary()
        );

        executor.install(|| {
            let convolver = Convolver::new(self.options.strategy, &psf, rows, cols, parallel);
            let observed = blurred.to_channels();
            let mut estimate = initial.to_channels();

            for step in 1..=iterations {
                if parallel {
                    estimate
                        .par_iter_mut()
                        .zip(observed.par_iter())
                        .for_each(|(est, obs)| update_channel(&convolver, est, obs, epsilon));
                } else {
                    estimate
                        .iter_mut()
                        .zip(observed.iter())
                        .for_each(|(est, obs)| update_channel(&convolver, est, obs, epsilon));
                }
                debug!("Richardson-Lucy iteration {}/{}", step, iterations);

                let snapshot = IterationSnapshot {
                    completed: step,
                    total: iterations,
                    shape,
                    channels: &estimate,
                };
                if observer.on_iteration(&snapshot).is_break() {
                    return Err(DeconvError::Cancelled {
                        completed: step,
                        requested: iterations,
                    });
                }
            }

            stack_channels(&estimate, shape)
        })?
    }
}

/// One multiplicative update of a single channel, in place
fn update_channel(
    convolver: &Convolver,
    estimate: &mut Array2<f64>,
    observed: &Array2<f64>,
    epsilon: f64,
) {
    let reblurred = convolver.forward(&estimate.view());
    let ratio = Zip::from(observed)
        .and(&reblurred)
        .map_collect(|&b, &c| b / c.max(epsilon));
    let correction = convolver.adjoint(&ratio.view());
    Zip::from(estimate)
        .and(&correction)
        .for_each(|e, &c| *e *= c);
}

/// Deblur with default options and the given iteration count
pub fn richardson_lucy(blurred: &FloatImage, psf: &Psf, iterations: usize) -> Result<FloatImage> {
    let options = RichardsonLucyOptions {
        iterations,
        ..Default::default()
    };
    RichardsonLucy::new(options).deblur(blurred, psf)
}
