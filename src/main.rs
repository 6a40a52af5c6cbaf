//! Command-line driver.
//!
//! Runs a simulation described by a configuration file inside a working
//! directory holding `input/`, `output/` and `checkpoints/`. Exits with
//! status 0 on normal completion and nonzero on any fatal condition.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use aronnax::{Model, RunConfig};

/// Idealized isopycnal ocean model on an Arakawa C-grid.
#[derive(Parser)]
#[command(name = "aronnax", version, about)]
struct Cli {
    /// Configuration file, relative to the working directory.
    #[arg(short, long, default_value = "aronnax.conf")]
    config: PathBuf,

    /// Working directory holding input/ and receiving output/.
    #[arg(short, long, default_value = ".")]
    work_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_secs()
        .init();

    let config_path = cli.work_dir.join(&cli.config);
    let config = RunConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut model = Model::new(config, &cli.work_dir).context("building model")?;
    let summary = model.run().context("running simulation")?;

    println!(
        "aronnax: completed {} steps (final step {}) in {:.2}s",
        summary.steps, summary.final_step, summary.wall_time
    );
    Ok(())
}
