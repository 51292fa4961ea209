//! Match observation.
//!
//! Every observer call happens on the confinement worker, in match order,
//! and must return quickly.

use crate::board::{Move, Seat, Situation};
use crate::rules::{GameResult, RuleSet};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receives match events from the orchestrator.
pub trait Observer: Send {
    /// A match started; `game` is a private copy of the starting position.
    fn on_game_set(&mut self, game: Box<dyn RuleSet>);

    /// Effective player names, in seat order.
    fn on_players(&mut self, _names: &[(Seat, String)]) {}

    /// `seat` made `mv`.
    fn on_moved(&mut self, seat: Seat, mv: &Move);

    /// `seat` broke a time limit or the rules and was penalized.
    fn on_limit_break(&mut self, seat: Seat, message: &str);

    /// The match was stopped from outside.
    fn on_interrupted(&mut self, message: &str);

    /// A player broke a limit outside its own move and the match was called
    /// off without a result. Follows the matching limit-break.
    fn on_aborted(&mut self, _message: &str) {}

    /// The match ran to its end.
    fn on_finished(&mut self, _result: Option<&GameResult>) {}
}

/// Observer events as plain data, for channel-based observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MatchEvent {
    /// Starting position.
    GameSet(Situation),
    /// Effective player names.
    Players(Vec<(Seat, String)>),
    /// A move was made.
    Moved {
        /// Seat that moved.
        seat: Seat,
        /// The move.
        mv: Move,
    },
    /// A seat was penalized.
    LimitBreak {
        /// Offending seat.
        seat: Seat,
        /// What happened.
        message: String,
    },
    /// The match was stopped.
    Interrupted(String),
    /// The match was called off after a limit break.
    Aborted(String),
    /// The match ended.
    Finished(Option<GameResult>),
}

impl MatchEvent {
    /// True for the events that end a match.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchEvent::Interrupted(_) | MatchEvent::Aborted(_) | MatchEvent::Finished(_)
        )
    }
}

fn forward(tx: &mpsc::UnboundedSender<MatchEvent>, event: MatchEvent) {
    if tx.send(event).is_err() {
        debug!("Match event receiver dropped");
    }
}

impl Observer for mpsc::UnboundedSender<MatchEvent> {
    fn on_game_set(&mut self, game: Box<dyn RuleSet>) {
        forward(self, MatchEvent::GameSet(game.situation()));
    }

    fn on_players(&mut self, names: &[(Seat, String)]) {
        forward(self, MatchEvent::Players(names.to_vec()));
    }

    fn on_moved(&mut self, seat: Seat, mv: &Move) {
        forward(
            self,
            MatchEvent::Moved {
                seat,
                mv: mv.clone(),
            },
        );
    }

    fn on_limit_break(&mut self, seat: Seat, message: &str) {
        forward(
            self,
            MatchEvent::LimitBreak {
                seat,
                message: message.to_string(),
            },
        );
    }

    fn on_interrupted(&mut self, message: &str) {
        forward(self, MatchEvent::Interrupted(message.to_string()));
    }

    fn on_aborted(&mut self, message: &str) {
        forward(self, MatchEvent::Aborted(message.to_string()));
    }

    fn on_finished(&mut self, result: Option<&GameResult>) {
        forward(self, MatchEvent::Finished(result.cloned()));
    }
}

/// Observer that only writes tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_game_set(&mut self, game: Box<dyn RuleSet>) {
        info!(seat = game.current_seat(), "Game set");
    }

    fn on_players(&mut self, names: &[(Seat, String)]) {
        for (seat, name) in names {
            info!(seat, name = %name, "Player seated");
        }
    }

    fn on_moved(&mut self, seat: Seat, mv: &Move) {
        info!(seat, mv = %mv, "Moved");
    }

    fn on_limit_break(&mut self, seat: Seat, message: &str) {
        warn!(seat, message, "Limit break");
    }

    fn on_interrupted(&mut self, message: &str) {
        warn!(message, "Match interrupted");
    }

    fn on_aborted(&mut self, message: &str) {
        warn!(message, "Match aborted");
    }

    fn on_finished(&mut self, result: Option<&GameResult>) {
        info!(?result, "Match finished");
    }
}
