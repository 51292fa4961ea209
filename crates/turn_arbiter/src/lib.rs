//! Turn Arbiter - confined match orchestration for turn-based board games
//!
//! Runs matches between pluggable players under a rule engine, keeping every
//! rule, player and observer object on a single confinement worker while
//! deadline watchdogs and stop requests are handled from outside.
//!
//! # Architecture
//!
//! - **Orchestrator**: public handle, confinement worker and turn loop
//! - **Watchdog**: per-call deadline timers that penalize slow players
//! - **Resolution**: prefix tree turning board selections into one legal move
//! - **Players**: algorithmic and human-driven players
//! - **Games**: reference rule sets (currently tic-tac-toe)
//!
//! # Example
//!
//! ```no_run
//! use turn_arbiter::{FirstMoveFactory, LogObserver, MatchConfig, Orchestrator, TicTacToeFactory};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(LogObserver);
//! orchestrator.set_rules(TicTacToeFactory::new()).await?;
//! orchestrator.set_player_factory(1, FirstMoveFactory::new("alice")).await?;
//! orchestrator.set_player_factory(2, FirstMoveFactory::new("bob")).await?;
//! orchestrator.play(MatchConfig::default()).await?;
//! orchestrator.wait().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod board;
mod config;
mod control;
mod error;
mod executors;
mod games;
mod observer;
mod orchestrator;
mod players;
mod resolution;
mod rules;
mod watchdog;

// Crate-level exports - Board vocabulary
pub use board::{
    Action, ActionKind, ActionList, Applied, Board, Direction, Move, Piece, Position, Seat, Situation,
};

// Crate-level exports - Configuration
pub use config::{ArbiterConfig, ConfigError, MatchConfig};

// Crate-level exports - Errors
pub use error::{MatchError, MatchErrorKind};

// Crate-level exports - Executors
pub use executors::{ExecutorPool, Executors};

// Crate-level exports - Reference games
pub use games::{Mark, TicTacToe, TicTacToeFactory};

// Crate-level exports - Observation
pub use observer::{LogObserver, MatchEvent, Observer};

// Crate-level exports - Orchestration
pub use orchestrator::{MatchState, Orchestrator};

// Crate-level exports - Players
pub use players::{FirstMoveFactory, FirstMovePlayer, HumanPlayer, HumanTurn, Player, PlayerFactory};

// Crate-level exports - Move resolution
pub use resolution::ResolutionTree;

// Crate-level exports - Rule contract
pub use rules::{GameResult, Mechanics, Parameter, RuleFactory, RuleSet};
