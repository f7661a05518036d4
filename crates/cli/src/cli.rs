use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive a single-consumer event loop from the command line.
///
/// Both commands build a loop from the config file (or `MSGLOOP_*`
/// environment variables), run it on the main thread, and exit once the
/// loop shuts down.
#[derive(Parser, Debug)]
#[command(name = "msgloop-cli", about = "Single-consumer event loop demo and stress driver")]
pub struct CliArgs {
    /// Path to a TOML loop config (defaults plus MSGLOOP_* env vars if unset)
    #[arg(long, env = "MSGLOOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print loop metrics as JSON after the loop stops
    #[arg(long)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Arm three one-shot timers and a shutdown timer, then run the loop.
    Demo {
        /// Multiplier applied to every delay (1.0 = 1s, 1.5s, 2s, shutdown at 9s)
        #[arg(long, default_value = "1.0")]
        scale: f64,
    },
    /// Post from many threads at once and verify per-thread ordering.
    Stress {
        /// Producer threads
        #[arg(long, default_value = "10")]
        threads: usize,

        /// Callbacks posted by each producer
        #[arg(long, default_value = "100")]
        per_thread: usize,
    },
}
