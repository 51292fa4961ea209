//! Contract between the orchestrator and a game's rule engine.
//!
//! Rule sets and their factories are not assumed to be safe for concurrent
//! or re-entrant use; the orchestrator only ever calls them from its
//! confinement worker.

use crate::board::{Move, Position, Seat, Situation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Fixed properties of a game variant.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new, derive_getters::Getters)]
pub struct Mechanics {
    /// Thinking time each move may take, if the game has a time control.
    move_time_limit: Option<Duration>,
    /// Every square on the board.
    positions: BTreeSet<Position>,
    /// Number of seats the game needs.
    seats: usize,
}

/// How a finished game ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// One seat won.
    Winner(Seat),
    /// Nobody won.
    Draw,
    /// The seat gave up.
    Resignation(Seat),
}

/// An authoritative game object.
pub trait RuleSet: Send {
    /// Fixed properties of this game.
    fn mechanics(&self) -> &Mechanics;

    /// Snapshot of the current position.
    fn situation(&self) -> Situation;

    /// Seat whose turn it is.
    fn current_seat(&self) -> Seat;

    /// Every move the current seat may make, including `Pass` when allowed.
    ///
    /// `Resign` is always allowed and need not be listed.
    fn legal_moves(&self) -> Vec<Move>;

    /// Applies `mv` for the current seat, returning false if it was rejected.
    fn apply_move(&mut self, mv: &Move) -> bool;

    /// The outcome, once the game is over.
    fn result(&self) -> Option<GameResult>;

    /// An independent copy that shares no state with `self`.
    fn copy(&self) -> Box<dyn RuleSet>;
}

/// A named, enumerated setting of a rule or player factory.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new, derive_getters::Getters)]
pub struct Parameter {
    /// Parameter name.
    name: String,
    /// Values the parameter accepts.
    allowed: Vec<String>,
    /// Current value.
    value: String,
}

impl Parameter {
    /// True if `value` is one of the allowed values.
    pub fn accepts(&self, value: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == value)
    }
}

/// Creates fresh rule objects for a game variant.
pub trait RuleFactory: Send {
    /// Game name.
    fn name(&self) -> &str;

    /// Number of seats a match needs.
    fn seats(&self) -> usize;

    /// Settings the game exposes.
    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Changes a setting. The value has already been checked against
    /// [`Parameter::allowed`].
    fn set_parameter(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        anyhow::bail!("{} has no parameter {name} (value {value})", self.name())
    }

    /// Builds a rule object in its starting position.
    fn create(&self) -> anyhow::Result<Box<dyn RuleSet>>;
}
