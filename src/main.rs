use std::{fs, path::PathBuf, thread};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use image_processors_rs::ImageProcessor;
use rayon::ThreadPoolBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::progress_tracker::ProgressTracker;

mod progress_tracker;

/// Preprocess every image under a directory with a `preprocessor_config.json`.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory searched recursively for images
    input_dir: PathBuf,

    /// Path to a preprocessor_config.json
    #[arg(short, long)]
    config: PathBuf,

    #[arg(
        short, long, default_value_t = thread::available_parallelism().map_or(1, |n| n.get())
    )]
    threads: usize,

    /// Emit JSON log lines instead of human-readable ones
    #[arg(long)]
    json_logs: bool,
}

/// Filter from `RUST_LOG`, defaulting to `info`.
fn setup_logging(json: bool) {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_level(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.json_logs);

    ensure!(
        cli.input_dir.is_dir(),
        "Input directory does not exist: {}",
        cli.input_dir.display()
    );
    ensure!(cli.threads > 0, "Thread count must be at least 1");

    let json = fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config.display()))?;
    let processor = ImageProcessor::from_json(&json)
        .with_context(|| format!("Invalid preprocessor config: {}", cli.config.display()))?;

    ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()?;

    let tracker = ProgressTracker::new(&cli.input_dir)?;
    tracing::info!(
        images = tracker.image_count(),
        threads = cli.threads,
        "starting preprocessing"
    );

    let summary = tracker.process_images(&processor);
    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        "finished preprocessing"
    );

    ensure!(
        summary.failed == 0,
        "{} of {} images failed",
        summary.failed,
        summary.processed + summary.failed
    );
    Ok(())
}
