//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::deconv::{ConvolutionStrategy, NormalizationPolicy};
use crate::pipeline::DeblurMethod;
use crate::postprocess::DenoiseMethod;

/// Restore blurred images with Richardson-Lucy or Wiener deconvolution
#[derive(Debug, Parser)]
#[command(name = "rl-deblur", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deblur an image
    Deblur(DeblurArgs),

    /// Show version, system and config information
    Info,
}

/// Arguments of the `deblur` command
///
/// Options without a value fall back to the config file, then to the
/// built-in defaults shown in the help text.
#[derive(Debug, Args)]
pub struct DeblurArgs {
    /// Blurred input image
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory [default: data/results]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Deblurring method [default: rl]
    #[arg(short, long, value_enum)]
    pub method: Option<DeblurMethod>,

    /// Gaussian PSF edge length [default: 5]
    #[arg(long)]
    pub psf_size: Option<usize>,

    /// Gaussian PSF sigma, non-positive derives it from the size [default: 1.0]
    #[arg(long, allow_negative_numbers = true)]
    pub psf_sigma: Option<f64>,

    /// Wiener regularization weight [default: 0.01]
    #[arg(long)]
    pub balance: Option<f64>,

    /// Richardson-Lucy iterations [default: 30]
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Convolution strategy [default: spatial]
    #[arg(long, value_enum)]
    pub strategy: Option<ConvolutionStrategy>,

    /// Worker threads (dedicated pool)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Run single-threaded
    #[arg(long)]
    pub sequential: bool,

    /// How a PSF that does not sum to 1 is handled [default: strict]
    #[arg(long, value_enum)]
    pub psf_check: Option<NormalizationPolicy>,

    /// Denoising after deblurring [default: none]
    #[arg(long, value_enum)]
    pub denoise: Option<DenoiseMethod>,

    /// Median filter radius [default: 1]
    #[arg(long)]
    pub denoise_radius: Option<usize>,

    /// NL-means patch size [default: 5]
    #[arg(long)]
    pub nl_patch_size: Option<usize>,

    /// NL-means search distance [default: 6]
    #[arg(long)]
    pub nl_patch_distance: Option<usize>,

    /// NL-means filtering strength [default: estimated]
    #[arg(long)]
    pub nl_h: Option<f64>,

    /// Apply an unsharp mask after deblurring
    #[arg(long)]
    pub enhance_edges: bool,

    /// Unsharp mask amount [default: 1.0]
    #[arg(long)]
    pub enhance_amount: Option<f64>,

    /// Unsharp mask radius [default: 1.0]
    #[arg(long)]
    pub enhance_radius: Option<f64>,

    /// Ground-truth image for PSNR / SSIM
    #[arg(long)]
    pub gt: Option<PathBuf>,

    /// Write the quality report as JSON (requires --gt)
    #[arg(long, requires = "gt")]
    pub metrics_json: Option<PathBuf>,

    /// Keep colour channels instead of converting to grayscale
    #[arg(long)]
    pub color: bool,

    /// Stop Richardson-Lucy after this many seconds
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    pub time_budget: Option<f64>,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the execution plan without processing
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl DeblurArgs {
    /// Values explicitly given on the command line
    pub fn to_overrides(&self) -> CliOverrides {
        CliOverrides {
            method: self.method,
            output: self.output.clone(),
            color: self.color.then_some(true),
            psf_size: self.psf_size,
            psf_sigma: self.psf_sigma,
            normalization: self.psf_check,
            iterations: self.iterations,
            strategy: self.strategy,
            balance: self.balance,
            denoise: self.denoise,
            denoise_radius: self.denoise_radius,
            nl_patch_size: self.nl_patch_size,
            nl_patch_distance: self.nl_patch_distance,
            nl_h: self.nl_h,
            enhance_edges: self.enhance_edges.then_some(true),
            enhance_amount: self.enhance_amount,
            enhance_radius: self.enhance_radius,
            sequential: self.sequential.then_some(true),
            threads: self.threads,
            time_budget: self.time_budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse_deblur(args: &[&str]) -> DeblurArgs {
        let mut argv = vec!["rl-deblur", "deblur"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Deblur(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_minimal_deblur() {
        let args = parse_deblur(&["-i", "blurred.png"]);
        assert_eq!(args.input, PathBuf::from("blurred.png"));
        assert!(args.method.is_none());
        assert_eq!(args.to_overrides(), CliOverrides::new());
    }

    #[test]
    fn test_full_deblur() {
        let args = parse_deblur(&[
            "-i",
            "in.png",
            "-o",
            "out",
            "-m",
            "wiener",
            "--psf-size",
            "7",
            "--strategy",
            "frequency",
            "--psf-check",
            "renormalize",
            "--denoise",
            "nl-means",
            "--nl-h",
            "0.1",
            "--enhance-edges",
            "--sequential",
            "--color",
            "-vv",
        ]);
        let overrides = args.to_overrides();
        assert_eq!(overrides.method, Some(DeblurMethod::Wiener));
        assert_eq!(overrides.psf_size, Some(7));
        assert_eq!(overrides.strategy, Some(ConvolutionStrategy::Frequency));
        assert_eq!(overrides.normalization, Some(NormalizationPolicy::Renormalize));
        assert_eq!(overrides.denoise, Some(DenoiseMethod::NlMeans));
        assert_eq!(overrides.nl_h, Some(0.1));
        assert_eq!(overrides.enhance_edges, Some(true));
        assert_eq!(overrides.sequential, Some(true));
        assert_eq!(overrides.color, Some(true));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_rejects_unknown_method() {
        let result = Cli::try_parse_from(["rl-deblur", "deblur", "-i", "a.png", "-m", "blind"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_metrics_json_requires_gt() {
        let result = Cli::try_parse_from([
            "rl-deblur",
            "deblur",
            "-i",
            "a.png",
            "--metrics-json",
            "m.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_info_command() {
        let cli = Cli::try_parse_from(["rl-deblur", "info"]).unwrap();
        assert!(matches!(cli.command, Commands::Info));
    }
}
