//! Simple algorithmic player for demos and testing.

use super::{Player, PlayerFactory, follow};
use crate::board::{Move, Seat};
use crate::executors::Executors;
use crate::rules::{Parameter, RuleSet};
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, instrument};

const DELAYS_MS: [&str; 4] = ["0", "10", "100", "500"];

/// Player that always picks the first legal move the rules list.
///
/// Falls back to passing, then to resigning, when no ordinary move exists.
/// With executors, moves are chosen on the aux pool (or the extra-thread
/// pool when no aux pool is set) and its copy of the game is updated on the
/// background pool.
pub struct FirstMovePlayer {
    name: String,
    delay: Duration,
    game: Option<Box<dyn RuleSet>>,
    executors: Option<Executors>,
}

impl FirstMovePlayer {
    /// Creates a new player that thinks for `delay` before each move.
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            game: None,
            executors: None,
        }
    }

    fn copy_game(&self) -> Result<Box<dyn RuleSet>> {
        self.game
            .as_ref()
            .map(|game| game.copy())
            .ok_or_else(|| anyhow::anyhow!("no game set"))
    }

    fn choose(moves: Vec<Move>) -> Move {
        moves
            .iter()
            .find(|mv| mv.actions().is_some())
            .or_else(|| moves.iter().find(|mv| **mv == Move::Pass))
            .cloned()
            .unwrap_or(Move::Resign)
    }
}

#[async_trait::async_trait]
impl Player for FirstMovePlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_game(&mut self, game: Box<dyn RuleSet>) -> Result<()> {
        self.game = Some(game);
        Ok(())
    }

    #[instrument(skip(self), fields(player = %self.name))]
    async fn get_move(&mut self) -> Result<Move> {
        if self.game.is_none() {
            anyhow::bail!("no game set");
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let pool = self
            .executors
            .as_ref()
            .and_then(|e| e.aux().clone().or_else(|| e.extra_threads().clone()));
        let copy = self.copy_game()?;
        let mv = match pool {
            Some(pool) => pool.run(move || Self::choose(copy.legal_moves())).await?,
            None => Self::choose(copy.legal_moves()),
        };
        debug!(mv = %mv, "Chose move");
        Ok(mv)
    }

    async fn moved(&mut self, seat: Seat, mv: &Move) -> Result<()> {
        let background = self.executors.as_ref().and_then(|e| e.background().clone());
        let Some(pool) = background else {
            return follow(self.game.as_mut(), seat, mv);
        };
        let mut game = self.game.take();
        let mv = mv.clone();
        let (game, replayed) = pool
            .run(move || {
                let replayed = follow(game.as_mut(), seat, &mv);
                (game, replayed)
            })
            .await?;
        self.game = game;
        replayed
    }

    fn provide_executors(&mut self, executors: &Executors) {
        self.executors = Some(executors.clone());
    }
}

/// Factory for [`FirstMovePlayer`] with a `delay_ms` parameter.
#[derive(Debug, Clone)]
pub struct FirstMoveFactory {
    name: String,
    delay_ms: String,
}

impl FirstMoveFactory {
    /// Creates a factory producing players called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay_ms: DELAYS_MS[0].to_string(),
        }
    }
}

impl PlayerFactory for FirstMoveFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::new(
            "delay_ms".to_string(),
            DELAYS_MS.iter().map(ToString::to_string).collect(),
            self.delay_ms.clone(),
        )]
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "delay_ms" => {
                self.delay_ms = value.to_string();
                Ok(())
            }
            other => anyhow::bail!("unknown parameter {other}"),
        }
    }

    fn create(&self) -> Result<Box<dyn Player>> {
        let delay = Duration::from_millis(self.delay_ms.parse()?);
        Ok(Box::new(FirstMovePlayer::new(self.name.clone(), delay)))
    }
}
