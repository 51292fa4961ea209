//! Human player that builds its move on an interaction surface.

use super::{Player, follow};
use crate::board::{Move, Seat};
use crate::orchestrator::MatchState;
use crate::resolution::ResolutionTree;
use crate::rules::RuleSet;
use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, instrument};

/// A human seat's turn, handed to the interaction surface.
#[derive(Debug)]
pub struct HumanTurn {
    /// Seat to move.
    pub seat: Seat,
    /// The selection session; exactly one terminal method should be called.
    pub tree: ResolutionTree,
    /// Match lifecycle, for surfaces that show whether the match is live.
    pub match_state: watch::Receiver<MatchState>,
}

/// Human player whose moves come from a [`ResolutionTree`].
///
/// Each turn sends a [`HumanTurn`] to the surface and waits until one of the
/// tree's terminal methods is called.
pub struct HumanPlayer {
    name: String,
    surface: mpsc::UnboundedSender<HumanTurn>,
    match_state: watch::Receiver<MatchState>,
    game: Option<Box<dyn RuleSet>>,
}

impl HumanPlayer {
    /// Creates a new human player.
    pub fn new(
        name: impl Into<String>,
        surface: mpsc::UnboundedSender<HumanTurn>,
        match_state: watch::Receiver<MatchState>,
    ) -> Self {
        Self {
            name: name.into(),
            surface,
            match_state,
            game: None,
        }
    }

    fn turn(&self, reply: oneshot::Sender<Move>) -> Result<HumanTurn> {
        let game = self
            .game
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no game set"))?;
        Ok(HumanTurn {
            seat: game.current_seat(),
            tree: ResolutionTree::for_game(game, reply),
            match_state: self.match_state.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Player for HumanPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_game(&mut self, game: Box<dyn RuleSet>) -> Result<()> {
        self.game = Some(game);
        Ok(())
    }

    #[instrument(skip(self), fields(player = %self.name))]
    async fn get_move(&mut self) -> Result<Move> {
        let (reply, choice) = oneshot::channel();
        let turn = self.turn(reply)?;
        self.surface
            .send(turn)
            .map_err(|_| anyhow::anyhow!("interaction surface is gone"))?;

        info!("Waiting for human selection");
        choice
            .await
            .map_err(|_| anyhow::anyhow!("resolution tree dropped without a terminal choice"))
    }

    async fn moved(&mut self, seat: Seat, mv: &Move) -> Result<()> {
        follow(self.game.as_mut(), seat, mv)
    }
}
