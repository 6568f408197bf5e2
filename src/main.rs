//! rl-deblur - Richardson-Lucy image deblurring
//!
//! CLI entry point

use anyhow::Context;
use clap::Parser;
use rl_deblur::{
    exit_codes,
    // CLI
    Cli, Commands, DeblurArgs,
    // Config
    Config, ConfigError, RunSettings,
    // Pipeline
    DeblurMethod, DeblurPipeline, PipelineError,
    // Progress
    IterationProgress, OutputMode,
};
use std::path::Path;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Deblur(args) => run_deblur(&args),
        Commands::Info => run_info(),
    };

    std::process::exit(match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    });
}

/// Map an error chain to a process exit code
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<PipelineError>() {
        e.exit_code()
    } else if error.downcast_ref::<ConfigError>().is_some() {
        exit_codes::INVALID_ARGS
    } else {
        exit_codes::GENERAL_ERROR
    }
}

fn init_tracing(mode: OutputMode) {
    tracing_subscriber::fmt()
        .with_max_level(mode.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============ Deblur Command ============

fn run_deblur(args: &DeblurArgs) -> anyhow::Result<()> {
    let mode = OutputMode::from_flags(args.verbose, args.quiet);
    init_tracing(mode);

    if !args.input.exists() {
        return Err(PipelineError::InputNotFound(args.input.clone()).into());
    }

    // Explicit config must load; implicit lookup falls back to defaults
    let file_config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring config file: {}", e);
            Config::default()
        }),
    };

    let settings = file_config.merge_with_cli(&args.to_overrides())?;
    let RunSettings {
        pipeline: pipeline_config,
        output_dir,
        time_budget,
    } = settings.clone();
    let pipeline = DeblurPipeline::new(pipeline_config);

    if args.dry_run {
        if mode.should_show(OutputMode::Normal) {
            print_execution_plan(args, &settings);
        }
        return Ok(());
    }

    let bar_mode = match pipeline.config().method {
        DeblurMethod::Rl => mode,
        DeblurMethod::Wiener => OutputMode::Quiet,
    };
    let mut progress = IterationProgress::new(pipeline.config().iterations, bar_mode);
    if let Some(budget) = time_budget {
        progress = progress.with_time_budget(budget);
    }

    let outcome = pipeline.process_file_with_image(&args.input, &output_dir, &mut progress);
    progress.finish();
    let (restored, result) = outcome?;

    if mode.should_show(OutputMode::Normal) {
        println!("Saved: {}", result.output_path.display());
        println!(
            "  {}x{} ({} channel{}), {} in {:.2}s",
            result.width,
            result.height,
            result.channels,
            if result.channels == 1 { "" } else { "s" },
            result.method.name(),
            result.elapsed_seconds
        );
    }

    if let Some(gt) = &args.gt {
        let report = pipeline.evaluate(&restored, gt)?;
        if mode.should_show(OutputMode::Normal) {
            println!("PSNR: {:.2} dB", report.psnr);
            println!("SSIM: {:.4}", report.ssim);
        }
        if mode.should_show(OutputMode::Verbose) {
            println!("MSE:  {:.6}", report.mse);
        }
        if let Some(path) = &args.metrics_json {
            write_json(path, &report)?;
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Print execution plan for dry-run mode
fn print_execution_plan(args: &DeblurArgs, settings: &RunSettings) {
    let config = &settings.pipeline;
    let pipeline = DeblurPipeline::new(config.clone());

    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Input: {}", args.input.display());
    println!(
        "Output: {}",
        pipeline.output_path(&args.input, &settings.output_dir).display()
    );
    println!(
        "Color mode: {}",
        if config.color { "RGB" } else { "grayscale" }
    );
    println!();
    println!("Pipeline Configuration:");
    println!(
        "  1. PSF: Gaussian {}x{}, sigma {} (check: {:?})",
        config.psf_size, config.psf_size, config.psf_sigma, config.normalization
    );
    match config.method {
        DeblurMethod::Rl => println!(
            "  2. Richardson-Lucy: {} iterations, {} convolution ({})",
            config.iterations,
            config.strategy.name(),
            config.strategy.boundary()
        ),
        DeblurMethod::Wiener => println!("  2. Wiener filter: balance {}", config.balance),
    }
    println!("  3. Denoise: {}", config.postprocess.denoise.name());
    match &config.postprocess.sharpen {
        Some(s) => println!(
            "  4. Edge enhancement: radius {}, amount {}",
            s.radius, s.amount
        ),
        None => println!("  4. Edge enhancement: DISABLED"),
    }
    println!();
    println!("Execution:");
    match config.executor {
        rl_deblur::Executor::Sequential => println!("  Threads: 1 (sequential)"),
        rl_deblur::Executor::Parallel { threads } => {
            println!("  Threads: {}", threads.unwrap_or_else(num_cpus::get))
        }
    }
    match settings.time_budget {
        Some(budget) => println!("  Time budget: {:.2}s", budget.as_secs_f64()),
        None => println!("  Time budget: unlimited"),
    }
    if let Some(gt) = &args.gt {
        println!("  Ground truth: {}", gt.display());
    }
}

// ============ Info Command ============

fn run_info() -> anyhow::Result<()> {
    println!("rl-deblur v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // System Information
    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    // Memory info (Linux)
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        if let Some(line) = meminfo.lines().find(|l| l.starts_with("MemTotal:")) {
            if let Some(kb) = line.split_whitespace().nth(1) {
                if let Ok(kb_val) = kb.parse::<u64>() {
                    println!("  Memory: {:.1} GB", kb_val as f64 / 1_048_576.0);
                }
            }
        }
    }

    // Config File Locations
    println!();
    println!("Config File Locations:");
    println!("  Local: ./{}", rl_deblur::config::LOCAL_CONFIG_FILE);
    if let Some(path) = Config::user_config_path() {
        println!("  User:  {}", path.display());
    }
    match Config::search_paths().into_iter().find(|p| p.is_file()) {
        Some(path) => println!("  Active: {}", path.display()),
        None => println!("  Active: built-in defaults"),
    }

    Ok(())
}
