//! Configuration file support
//!
//! Settings are read from a TOML file and merged with command-line flags.
//! CLI values win whenever they are given.
//!
//! # Lookup order
//!
//! 1. Path passed with `--config`
//! 2. `./rl-deblur.toml`
//! 3. `<user config dir>/rl-deblur/config.toml`
//! 4. Built-in defaults
//!
//! # Example
//!
//! ```toml
//! [deblur]
//! method = "rl"
//! output = "data/results"
//!
//! [psf]
//! size = 5
//! sigma = 1.0
//! normalization = "strict"
//!
//! [richardson_lucy]
//! iterations = 30
//! strategy = "spatial"
//!
//! [postprocess]
//! denoise = "median"
//! denoise_radius = 1
//!
//! [execution]
//! threads = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::deconv::{
    ConvolutionStrategy, Executor, NormalizationPolicy, DEFAULT_EPSILON, DEFAULT_ITERATIONS,
    DEFAULT_WIENER_BALANCE,
};
use crate::pipeline::{
    DeblurMethod, PipelineConfig, DEFAULT_OUTPUT_DIR, DEFAULT_PSF_SIGMA, DEFAULT_PSF_SIZE,
};
use crate::postprocess::{
    DenoiseMethod, NlMeansOptions, PostprocessOptions, UnsharpOptions, DEFAULT_MEDIAN_RADIUS,
    DEFAULT_PATCH_DISTANCE, DEFAULT_PATCH_SIZE, DEFAULT_UNSHARP_AMOUNT, DEFAULT_UNSHARP_RADIUS,
};

/// Config file name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "rl-deblur.toml";

/// Application directory under the user config dir
const APP_DIR: &str = "rl-deblur";

// ============================================================
// Error Types
// ============================================================

/// Config error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// File Sections
// ============================================================

/// `[deblur]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeblurSection {
    pub method: DeblurMethod,
    pub output: PathBuf,
    pub color: bool,
}

impl Default for DeblurSection {
    fn default() -> Self {
        Self {
            method: DeblurMethod::Rl,
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            color: false,
        }
    }
}

/// `[psf]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfSection {
    pub size: usize,
    pub sigma: f64,
    pub normalization: NormalizationPolicy,
}

impl Default for PsfSection {
    fn default() -> Self {
        Self {
            size: DEFAULT_PSF_SIZE,
            sigma: DEFAULT_PSF_SIGMA,
            normalization: NormalizationPolicy::Strict,
        }
    }
}

/// `[richardson_lucy]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichardsonLucySection {
    pub iterations: usize,
    pub strategy: ConvolutionStrategy,
    pub epsilon: f64,
}

impl Default for RichardsonLucySection {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            strategy: ConvolutionStrategy::Spatial,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// `[wiener]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WienerSection {
    pub balance: f64,
}

impl Default for WienerSection {
    fn default() -> Self {
        Self {
            balance: DEFAULT_WIENER_BALANCE,
        }
    }
}

/// `[postprocess]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessSection {
    pub denoise: DenoiseMethod,
    pub denoise_radius: usize,
    pub nl_patch_size: usize,
    pub nl_patch_distance: usize,
    pub nl_h: Option<f64>,
    pub enhance_edges: bool,
    pub enhance_amount: f64,
    pub enhance_radius: f64,
}

impl Default for PostprocessSection {
    fn default() -> Self {
        Self {
            denoise: DenoiseMethod::None,
            denoise_radius: DEFAULT_MEDIAN_RADIUS,
            nl_patch_size: DEFAULT_PATCH_SIZE,
            nl_patch_distance: DEFAULT_PATCH_DISTANCE,
            nl_h: None,
            enhance_edges: false,
            enhance_amount: DEFAULT_UNSHARP_AMOUNT,
            enhance_radius: DEFAULT_UNSHARP_RADIUS,
        }
    }
}

/// `[execution]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Run on the calling thread only
    pub sequential: bool,

    /// Dedicated pool size; the global rayon pool when unset
    pub threads: Option<usize>,

    /// Wall-clock budget for Richardson-Lucy, in seconds
    pub time_budget: Option<f64>,
}

/// Whole config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub deblur: DeblurSection,
    pub psf: PsfSection,
    pub richardson_lucy: RichardsonLucySection,
    pub wiener: WienerSection,
    pub postprocess: PostprocessSection,
    pub execution: ExecutionSection,
}

// ============================================================
// CLI Overrides
// ============================================================

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub method: Option<DeblurMethod>,
    pub output: Option<PathBuf>,
    pub color: Option<bool>,
    pub psf_size: Option<usize>,
    pub psf_sigma: Option<f64>,
    pub normalization: Option<NormalizationPolicy>,
    pub iterations: Option<usize>,
    pub strategy: Option<ConvolutionStrategy>,
    pub balance: Option<f64>,
    pub denoise: Option<DenoiseMethod>,
    pub denoise_radius: Option<usize>,
    pub nl_patch_size: Option<usize>,
    pub nl_patch_distance: Option<usize>,
    pub nl_h: Option<f64>,
    pub enhance_edges: Option<bool>,
    pub enhance_amount: Option<f64>,
    pub enhance_radius: Option<f64>,
    pub sequential: Option<bool>,
    pub threads: Option<usize>,
    pub time_budget: Option<f64>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything a run needs after merging file and CLI values
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub pipeline: PipelineConfig,
    pub output_dir: PathBuf,
    pub time_budget: Option<Duration>,
}

// ============================================================
// Loading and Merging
// ============================================================

impl Config {
    /// `<user config dir>/rl-deblur/config.toml`, if the platform has one
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Implicit lookup locations, in priority order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        paths.extend(Self::user_config_path());
        paths
    }

    /// First config found in [`Config::search_paths`], or defaults
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::load_from_path(&path);
            }
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge with CLI values, CLI taking precedence
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> Result<RunSettings> {
        let post = &self.postprocess;
        let exec = &self.execution;

        let sequential = cli.sequential.unwrap_or(exec.sequential);
        let executor = if sequential {
            Executor::Sequential
        } else {
            Executor::Parallel {
                threads: cli.threads.or(exec.threads),
            }
        };

        let sharpen = cli
            .enhance_edges
            .unwrap_or(post.enhance_edges)
            .then(|| UnsharpOptions {
                radius: cli.enhance_radius.unwrap_or(post.enhance_radius),
                amount: cli.enhance_amount.unwrap_or(post.enhance_amount),
            });

        let postprocess = PostprocessOptions {
            denoise: cli.denoise.unwrap_or(post.denoise),
            median_radius: cli.denoise_radius.unwrap_or(post.denoise_radius),
            nl_means: NlMeansOptions {
                patch_size: cli.nl_patch_size.unwrap_or(post.nl_patch_size),
                patch_distance: cli.nl_patch_distance.unwrap_or(post.nl_patch_distance),
                h: cli.nl_h.or(post.nl_h),
            },
            sharpen,
        };

        let pipeline = PipelineConfig {
            method: cli.method.unwrap_or(self.deblur.method),
            psf_size: cli.psf_size.unwrap_or(self.psf.size),
            psf_sigma: cli.psf_sigma.unwrap_or(self.psf.sigma),
            iterations: cli.iterations.unwrap_or(self.richardson_lucy.iterations),
            strategy: cli.strategy.unwrap_or(self.richardson_lucy.strategy),
            epsilon: self.richardson_lucy.epsilon,
            balance: cli.balance.unwrap_or(self.wiener.balance),
            normalization: cli.normalization.unwrap_or(self.psf.normalization),
            executor,
            postprocess,
            color: cli.color.unwrap_or(self.deblur.color),
        };

        let time_budget = cli
            .time_budget
            .or(exec.time_budget)
            .map(parse_time_budget)
            .transpose()?;

        Ok(RunSettings {
            pipeline,
            output_dir: cli
                .output
                .clone()
                .unwrap_or_else(|| self.deblur.output.clone()),
            time_budget,
        })
    }
}

/// Seconds to a `Duration`, rejecting negative, NaN and overflowing values
fn parse_time_budget(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key: "time_budget",
        reason: format!("{} ({})", secs, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_merge_matches_pipeline_default() {
        let settings = Config::default()
            .merge_with_cli(&CliOverrides::new())
            .unwrap();
        assert_eq!(settings.pipeline, PipelineConfig::default());
        assert_eq!(settings.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(settings.time_budget.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::from_toml_str(
            r#"
            [deblur]
            method = "wiener"

            [psf]
            size = 9
            normalization = "renormalize"

            [richardson_lucy]
            strategy = "frequency"

            [postprocess]
            denoise = "nl-means"
            nl_h = 0.05
            enhance_edges = true

            [execution]
            threads = 2
            time_budget = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(config.deblur.method, DeblurMethod::Wiener);
        assert_eq!(config.psf.size, 9);
        assert_eq!(config.psf.sigma, DEFAULT_PSF_SIGMA);
        assert_eq!(config.richardson_lucy.iterations, DEFAULT_ITERATIONS);

        let settings = config.merge_with_cli(&CliOverrides::new()).unwrap();
        let p = &settings.pipeline;
        assert_eq!(p.method, DeblurMethod::Wiener);
        assert_eq!(p.strategy, ConvolutionStrategy::Frequency);
        assert_eq!(p.normalization, NormalizationPolicy::Renormalize);
        assert_eq!(p.executor, Executor::Parallel { threads: Some(2) });
        assert_eq!(p.postprocess.denoise, DenoiseMethod::NlMeans);
        assert_eq!(p.postprocess.nl_means.h, Some(0.05));
        assert_eq!(p.postprocess.sharpen, Some(UnsharpOptions::default()));
        assert_eq!(settings.time_budget, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = Config::from_toml_str(
            r#"
            [richardson_lucy]
            iterations = 50

            [execution]
            threads = 8
            "#,
        )
        .unwrap();

        let cli = CliOverrides {
            iterations: Some(12),
            sequential: Some(true),
            output: Some(PathBuf::from("out")),
            ..CliOverrides::new()
        };
        let settings = config.merge_with_cli(&cli).unwrap();
        assert_eq!(settings.pipeline.iterations, 12);
        assert_eq!(settings.pipeline.executor, Executor::Sequential);
        assert_eq!(settings.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_invalid_time_budget_rejected() {
        for secs in [-5.0, f64::NAN, 1e20] {
            let cli = CliOverrides {
                time_budget: Some(secs),
                ..CliOverrides::new()
            };
            let result = Config::default().merge_with_cli(&cli);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { key: "time_budget", .. })),
                "{} accepted",
                secs
            );
        }
    }

    #[test]
    fn test_invalid_time_budget_in_file_rejected() {
        let config = Config::from_toml_str("[execution]\ntime_budget = -1.0\n").unwrap();
        assert!(config.merge_with_cli(&CliOverrides::new()).is_err());
    }

    #[test]
    fn test_zero_time_budget_accepted() {
        let cli = CliOverrides {
            time_budget: Some(0.0),
            ..CliOverrides::new()
        };
        let settings = Config::default().merge_with_cli(&cli).unwrap();
        assert_eq!(settings.time_budget, Some(Duration::ZERO));
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        let result = Config::from_toml_str("[richardson_lucy]\nstrategy = \"gpu\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.richardson_lucy.iterations = 42;
        config.postprocess.denoise = DenoiseMethod::Median;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(Config::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_error() {
        let dir = tempdir().unwrap();
        let result = Config::load_from_path(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_search_paths_start_local() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(LOCAL_CONFIG_FILE));
    }
}
