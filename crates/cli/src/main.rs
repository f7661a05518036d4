mod cli;
mod demo;
mod stress;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use msgloop_core::config::load_dotenv;
use msgloop_core::LoopConfig;
use msgloop_runtime::EventLoop;

use crate::cli::{CliArgs, Command};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    // Load config
    let config = match &args.config {
        Some(path) => LoopConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LoopConfig::from_env().context("failed to load config from environment")?,
    };
    config.log_summary();

    let event_loop = EventLoop::new(config).context("failed to create event loop")?;

    let outcome = match args.command {
        Command::Demo { scale } => demo::run(&event_loop, scale),
        Command::Stress {
            threads,
            per_thread,
        } => stress::run(&event_loop, threads, per_thread),
    };

    if args.metrics {
        let metrics = event_loop.metrics();
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }

    info!("msgloop-cli exiting");
    outcome
}
