//! Progress display for deblurring runs
//!
//! Maps `-v` / `-q` onto an output mode and shows Richardson-Lucy
//! iterations on an `indicatif` bar, optionally enforcing a time budget.

use indicatif::{ProgressBar, ProgressStyle};
use std::ops::ControlFlow;
use std::time::Duration;

use crate::deconv::{Deadline, IterationObserver, IterationSnapshot};

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Errors only
    Quiet,
    /// Stage messages and progress bar
    #[default]
    Normal,
    /// Per-stage details
    Verbose,
    /// Per-iteration details
    VeryVerbose,
}

impl OutputMode {
    /// Create OutputMode from verbosity level
    pub fn from_verbosity(level: u8) -> Self {
        match level {
            0 => OutputMode::Normal,
            1 => OutputMode::Verbose,
            _ => OutputMode::VeryVerbose,
        }
    }

    /// `--quiet` wins over any `-v`
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            OutputMode::Quiet
        } else {
            Self::from_verbosity(verbose)
        }
    }

    /// Check if output should be shown at this mode
    pub fn should_show(&self, required: OutputMode) -> bool {
        use OutputMode::*;
        match (self, required) {
            (Quiet, _) => false,
            (Normal, Quiet | Normal) => true,
            (Verbose, Quiet | Normal | Verbose) => true,
            (VeryVerbose, _) => true,
            _ => false,
        }
    }

    /// Matching `tracing` level filter
    pub fn log_level(&self) -> tracing::Level {
        match self {
            OutputMode::Quiet => tracing::Level::ERROR,
            OutputMode::Normal => tracing::Level::WARN,
            OutputMode::Verbose => tracing::Level::INFO,
            OutputMode::VeryVerbose => tracing::Level::DEBUG,
        }
    }
}

const BAR_TEMPLATE: &str = "  {prefix} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})";

/// Iteration observer drawing a progress bar
pub struct IterationProgress {
    bar: ProgressBar,
    deadline: Option<Deadline>,
}

impl IterationProgress {
    /// Bar over `total` iterations, hidden in quiet mode
    pub fn new(total: usize, mode: OutputMode) -> Self {
        let bar = if mode.should_show(OutputMode::Normal) {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::with_template(BAR_TEMPLATE)
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_prefix("Richardson-Lucy");
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            deadline: None,
        }
    }

    /// Cancel once `budget` has elapsed, counted from now
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.deadline = Some(Deadline::new(budget));
        self
    }

    /// Iterations reported so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl IterationObserver for IterationProgress {
    fn on_iteration(&mut self, snapshot: &IterationSnapshot<'_>) -> ControlFlow<()> {
        self.bar.set_position(snapshot.completed() as u64);

        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.on_iteration(snapshot).is_break() {
                self.bar.abandon_with_message("time budget exhausted");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deconv::{
        DeconvError, Executor, Psf, RichardsonLucy, RichardsonLucyOptions,
    };
    use crate::raster::FloatImage;

    fn run(observer: &mut IterationProgress, iterations: usize) -> Result<FloatImage, DeconvError> {
        let img = FloatImage::from_fn(12, 12, 1, |r, c, _| ((r + c) % 4) as f64 / 3.0).unwrap();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let options = RichardsonLucyOptions::builder()
            .iterations(iterations)
            .executor(Executor::Sequential)
            .build();
        RichardsonLucy::new(options).deblur_with_observer(&img, &psf, observer)
    }

    #[test]
    fn test_output_mode_from_verbosity() {
        assert_eq!(OutputMode::from_verbosity(0), OutputMode::Normal);
        assert_eq!(OutputMode::from_verbosity(1), OutputMode::Verbose);
        assert_eq!(OutputMode::from_verbosity(2), OutputMode::VeryVerbose);
        assert_eq!(OutputMode::from_verbosity(10), OutputMode::VeryVerbose);
    }

    #[test]
    fn test_output_mode_from_flags() {
        assert_eq!(OutputMode::from_flags(3, true), OutputMode::Quiet);
        assert_eq!(OutputMode::from_flags(1, false), OutputMode::Verbose);
    }

    #[test]
    fn test_output_mode_quiet() {
        let mode = OutputMode::Quiet;
        assert!(!mode.should_show(OutputMode::Quiet));
        assert!(!mode.should_show(OutputMode::Normal));
        assert!(!mode.should_show(OutputMode::Verbose));
    }

    #[test]
    fn test_output_mode_normal() {
        let mode = OutputMode::Normal;
        assert!(mode.should_show(OutputMode::Normal));
        assert!(!mode.should_show(OutputMode::Verbose));
        assert!(!mode.should_show(OutputMode::VeryVerbose));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(OutputMode::Quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(OutputMode::VeryVerbose.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_progress_tracks_iterations() {
        let mut progress = IterationProgress::new(6, OutputMode::Quiet);
        run(&mut progress, 6).unwrap();
        assert_eq!(progress.position(), 6);
        progress.finish();
    }

    #[test]
    fn test_time_budget_cancels() {
        let mut progress =
            IterationProgress::new(20, OutputMode::Quiet).with_time_budget(Duration::ZERO);
        let err = run(&mut progress, 20).unwrap_err();
        assert!(matches!(err, DeconvError::Cancelled { completed: 1, .. }));
        assert_eq!(progress.position(), 1);
    }
}
