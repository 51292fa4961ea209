//! Player trait and implementations.

mod first_move;
mod human;

pub use first_move::{FirstMoveFactory, FirstMovePlayer};
pub use human::{HumanPlayer, HumanTurn};

use crate::board::{Move, Seat};
use crate::executors::Executors;
use crate::rules::{Parameter, RuleSet};
use anyhow::Result;

/// Trait for players that can make moves.
///
/// Players are only ever called from the orchestrator's confinement worker,
/// one call at a time.
#[async_trait::async_trait]
pub trait Player: Send {
    /// Returns the player's display name.
    fn name(&self) -> &str;

    /// Hands the player its private copy of a freshly started game.
    async fn set_game(&mut self, game: Box<dyn RuleSet>) -> Result<()>;

    /// Gets a move from this player for the current position.
    async fn get_move(&mut self) -> Result<Move>;

    /// Tells the player that `seat` made `mv`.
    async fn moved(&mut self, seat: Seat, mv: &Move) -> Result<()>;

    /// Offers the pools configured for the upcoming match.
    fn provide_executors(&mut self, _executors: &Executors) {}
}

/// Creates players of one kind.
pub trait PlayerFactory: Send {
    /// Kind name.
    fn name(&self) -> &str;

    /// Settings this kind of player exposes.
    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Changes a setting. The value has already been checked against
    /// [`Parameter::allowed`].
    fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        anyhow::bail!("{} has no parameter {name} (value {value})", self.name())
    }

    /// Builds a player with the current settings.
    fn create(&self) -> Result<Box<dyn Player>>;
}

/// Applies `mv` to a player's private copy, failing if the copy rejects it.
pub(crate) fn follow(game: Option<&mut Box<dyn RuleSet>>, seat: Seat, mv: &Move) -> Result<()> {
    let game = game.ok_or_else(|| anyhow::anyhow!("no game set"))?;
    if !game.apply_move(mv) {
        anyhow::bail!("private copy rejected {mv} by seat {seat}");
    }
    Ok(())
}
