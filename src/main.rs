//! rl-deblur - stabilized Richardson-Lucy deconvolution
//!
//! CLI entry point

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use rl_deblur::{
    collect_images, exit_codes, BatchError, BatchProcessor, BatchProgress, Backend, Cli,
    Commands, Config, ConfigError, DeconvError, OutputMode, RunArgs, RunConfig,
};

fn main() {
    let cli = Cli::parse();

    let mode = match &cli.command {
        Commands::Run(args) => OutputMode::from_flags(args.verbose, args.quiet),
        Commands::Info => OutputMode::Normal,
    };
    tracing_subscriber::fmt()
        .with_max_level(mode.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run_deblur(&args, mode),
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

/// Map an error to the process exit code
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if let Some(batch) = error.downcast_ref::<BatchError>() {
        return match batch {
            BatchError::InputNotFound(_) | BatchError::NoImages(_) => exit_codes::INPUT_NOT_FOUND,
            BatchError::Deconv(DeconvError::InvalidParameter(_)) => exit_codes::INVALID_ARGS,
            _ => exit_codes::GENERAL_ERROR,
        };
    }
    if error.downcast_ref::<ConfigError>().is_some() {
        return exit_codes::INVALID_ARGS;
    }
    match error.downcast_ref::<DeconvError>() {
        Some(DeconvError::InvalidParameter(_)) => exit_codes::INVALID_ARGS,
        _ => exit_codes::GENERAL_ERROR,
    }
}

// ============ Run Command ============

fn run_deblur(args: &RunArgs, mode: OutputMode) -> anyhow::Result<()> {
    let start_time = Instant::now();

    let config_path = args.config.clone().or_else(Config::find);
    let file_config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => Config::default(),
    };
    let config = file_config.merge_with_cli(&args.overrides());

    // Validate everything before touching the filesystem.
    let options = config.deconv_options()?;
    let psf = config.psf()?;
    let backend = config.gpu.resolve();

    if args.dry_run {
        print_execution_plan(args, &config, backend)?;
        return Ok(());
    }

    let processor = BatchProcessor::new(backend, options, psf)?
        .with_threads(config.threads.unwrap_or(1))
        .with_parallel_channels(config.parallel_channels);
    tracing::info!(
        "Backend: {}, PSF {}x{} sigma {}, {} iteration(s), {} thread(s)",
        backend,
        config.psf_size,
        config.psf_size,
        config.psf_sigma,
        config.iterations,
        processor.threads()
    );

    let progress = BatchProgress::new(mode);
    let summary = processor.run(&args.input_dir, &args.output_dir, &progress)?;

    if mode.should_show(OutputMode::Normal) {
        println!("{}", summary);
        println!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    if summary.has_failures() {
        bail!("{} file(s) failed to process", summary.failed);
    }
    Ok(())
}

/// Print execution plan for dry-run mode
fn print_execution_plan(args: &RunArgs, config: &RunConfig, backend: Backend) -> anyhow::Result<()> {
    let files: Vec<PathBuf> = collect_images(&args.input_dir)?;

    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Input:   {}", args.input_dir.display());
    println!("Output:  {}", args.output_dir.display());
    println!("Backend: {}", backend);
    println!();
    println!("Configuration:");
    println!("{}", config.to_json()?);
    println!();
    println!("Files ({}):", files.len());
    for (i, file) in files.iter().enumerate() {
        println!("  {}. {}", i + 1, file.display());
    }
    Ok(())
}

// ============ Info Command ============

fn run_info() -> anyhow::Result<()> {
    println!("rl-deblur v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Backends:");
    for backend in Backend::available() {
        println!("  {}: available", backend);
    }
    println!(
        "  auto resolves to: {}",
        rl_deblur::BackendPreference::Auto.resolve()
    );

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let status = if path.is_file() { "found" } else { "not found" };
        println!("  {} ({})", path.display(), status);
    }

    Ok(())
}
