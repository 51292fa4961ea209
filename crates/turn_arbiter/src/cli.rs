//! Command-line interface for turn_arbiter.

use clap::{Parser, Subcommand};

/// Turn Arbiter - run matches between built-in players
#[derive(Parser, Debug)]
#[command(name = "turn_arbiter")]
#[command(about = "Confined match orchestration for turn-based board games", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play tic-tac-toe matches between two first-move players
    Play {
        /// Path to orchestrator config (TOML)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Number of matches to play
        #[arg(short, long, default_value = "1")]
        games: u32,

        /// Print match events as JSON lines
        #[arg(long)]
        json: bool,

        /// Per-move think time of both players, in milliseconds (0, 10, 100 or 500)
        #[arg(long, default_value = "0")]
        delay_ms: String,
    },
}
