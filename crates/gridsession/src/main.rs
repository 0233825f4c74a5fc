//! gridsession - replicated session store
//!
//! Main entry point for the gridsession CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gridsession_config::{DiscoveryOptions, LoadedConfig};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

use commands::{config, simulate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// gridsession - replicated session store
#[derive(Parser)]
#[command(name = "gridsession")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this config file instead of discovering config layers
    #[arg(long, global = true, env = "GRIDSESSION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management
    Config(config::ConfigArgs),

    /// Run an in-process session lifecycle and print the resulting events
    Simulate(simulate::SimulateArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut options = DiscoveryOptions::default();
    if let Some(path) = &cli.config {
        options = options.with_explicit_file(path);
    }
    let loaded = gridsession_config::load_config_with_options(&options)
        .context("failed to load configuration")?;

    let _guard = init_tracing(&cli, &loaded);
    for warning in loaded.warnings() {
        tracing::warn!("{warning}");
    }

    let ctx = commands::Context {
        config: loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Simulate(args) => simulate::run(args, &ctx).await,
    }
}

/// Console logging to stderr plus a daily rolling JSON log file.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(
    cli: &Cli,
    loaded: &LoadedConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let logging = loaded.config.logging();
    let filter = if cli.verbose {
        "gridsession=debug,gridsession_core=debug,gridsession_config=debug,info".to_string()
    } else {
        let level = &logging.level;
        format!("gridsession={level},gridsession_core={level},gridsession_config={level},warn")
    };

    let console_json = logging.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new(&filter))
    });
    let console_text = (!logging.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new(&filter))
    });

    let log_dir = gridsession_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let (file_layer, guard) = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("gridsession.log")
        .build(&log_dir)
    {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "gridsession=trace,gridsession_core=trace,gridsession_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("warning: file logging disabled ({}): {e}", log_dir.display());
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .init();

    guard
}
