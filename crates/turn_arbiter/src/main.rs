//! Turn Arbiter - demo CLI
//!
//! Plays tic-tac-toe between built-in players and prints the match events.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;
use turn_arbiter::{ArbiterConfig, FirstMoveFactory, MatchEvent, Orchestrator, TicTacToeFactory};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Play {
            config,
            games,
            json,
            delay_ms,
        } => run_matches(config, games, json, delay_ms).await,
    }
}

/// Play `games` matches in a row on one orchestrator.
#[instrument]
async fn run_matches(
    config: Option<PathBuf>,
    games: u32,
    json: bool,
    delay_ms: String,
) -> Result<()> {
    let config = match config {
        Some(path) => ArbiterConfig::from_file(path)?,
        None => ArbiterConfig::default(),
    };

    let default_filter = config.log_filter().clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (events, mut received) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::from_config(events, &config);
    orchestrator.set_rules(TicTacToeFactory::new()).await?;
    for (seat, name) in [(1, "first"), (2, "second")] {
        orchestrator
            .set_player_factory(seat, FirstMoveFactory::new(name))
            .await?;
        orchestrator
            .set_player_parameter(seat, "delay_ms", &delay_ms)
            .await?;
    }

    for game in 1..=games {
        info!(game, "Starting match");
        orchestrator.play(config.match_config()).await?;
        while let Some(event) = received.recv().await {
            print_event(&event, json)?;
            if event.is_terminal() {
                break;
            }
        }
        orchestrator.wait().await;
    }
    Ok(())
}

fn print_event(event: &MatchEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        MatchEvent::GameSet(situation) => println!("New game, seat {} to move", situation.seat()),
        MatchEvent::Players(names) => {
            for (seat, name) in names {
                println!("  seat {seat}: {name}");
            }
        }
        MatchEvent::Moved { seat, mv } => println!("  {seat} plays {mv}"),
        MatchEvent::LimitBreak { seat, message } => println!("  {seat} penalized: {message}"),
        MatchEvent::Interrupted(message) => println!("Interrupted: {message}"),
        MatchEvent::Aborted(message) => println!("Aborted: {message}"),
        MatchEvent::Finished(result) => println!("Finished: {result:?}"),
    }
    Ok(())
}
