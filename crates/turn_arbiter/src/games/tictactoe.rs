//! Tic-tac-toe on the generic board vocabulary.

use crate::board::{Action, Board, Move, Piece, Position, Seat, Situation};
use crate::rules::{GameResult, Mechanics, Parameter, RuleFactory, RuleSet};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, instrument};

const SIZE: i32 = 3;
const TIME_LIMITS: [&str; 4] = ["none", "250", "1000", "10000"];

const LINES: [[(i32, i32); 3]; 8] = [
    // Rows
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    // Columns
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    // Diagonals
    [(0, 0), (1, 1), (2, 2)],
    [(2, 0), (1, 1), (0, 2)],
];

/// Player mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Mark {
    /// Seat 1, moves first.
    X,
    /// Seat 2.
    O,
}

impl Mark {
    /// Mark played by `seat`.
    pub fn for_seat(seat: Seat) -> Self {
        if seat == 1 { Mark::X } else { Mark::O }
    }

    /// Seat playing this mark.
    pub fn seat(self) -> Seat {
        match self {
            Mark::X => 1,
            Mark::O => 2,
        }
    }

    /// Returns the opponent mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// The piece this mark places.
    pub fn piece(self) -> Piece {
        Piece::new(self.to_string(), self.seat())
    }
}

/// Checks if there is a winner on the board.
#[instrument(skip(board))]
fn check_winner(board: &Board) -> Option<Seat> {
    LINES.iter().find_map(|line| {
        let [a, b, c] = line.map(|(x, y)| board.get(Position::new(x, y)));
        match (a, b, c) {
            (Some(a), Some(b), Some(c)) if a == b && b == c => *a.owner(),
            _ => None,
        }
    })
}

/// A game of tic-tac-toe.
#[derive(Debug, Clone)]
pub struct TicTacToe {
    mechanics: Mechanics,
    board: Board,
    to_move: Mark,
    result: Option<GameResult>,
}

impl TicTacToe {
    /// Creates a new game with an empty board and X to move.
    pub fn new(move_time_limit: Option<Duration>) -> Self {
        let positions = (0..SIZE)
            .flat_map(|y| (0..SIZE).map(move |x| Position::new(x, y)))
            .collect::<BTreeSet<_>>();
        Self {
            mechanics: Mechanics::new(move_time_limit, positions, 2),
            board: Board::new(),
            to_move: Mark::X,
            result: None,
        }
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Squares in row-major order.
    fn squares() -> impl Iterator<Item = Position> {
        (0..SIZE).flat_map(|y| (0..SIZE).map(move |x| Position::new(x, y)))
    }

    fn is_full(&self) -> bool {
        Self::squares().all(|position| !self.board.is_empty(position))
    }
}

impl RuleSet for TicTacToe {
    fn mechanics(&self) -> &Mechanics {
        &self.mechanics
    }

    fn situation(&self) -> Situation {
        Situation::new(self.board.clone(), self.to_move.seat())
    }

    fn current_seat(&self) -> Seat {
        self.to_move.seat()
    }

    fn legal_moves(&self) -> Vec<Move> {
        if self.result.is_some() {
            return Vec::new();
        }
        let piece = self.to_move.piece();
        Self::squares()
            .filter(|position| self.board.is_empty(*position))
            .map(|position| Move::Actions(vec![Action::add([position], piece.clone())]))
            .collect()
    }

    #[instrument(skip(self), fields(mark = %self.to_move))]
    fn apply_move(&mut self, mv: &Move) -> bool {
        if self.result.is_some() {
            return false;
        }
        match mv {
            Move::Resign => {
                self.result = Some(GameResult::Resignation(self.to_move.seat()));
                true
            }
            Move::Pass => false,
            Move::Actions(_) => {
                if !self.legal_moves().contains(mv) {
                    debug!(mv = %mv, "Rejected move");
                    return false;
                }
                for action in mv.actions().into_iter().flatten() {
                    self.board.apply(action);
                }
                if let Some(winner) = check_winner(&self.board) {
                    self.result = Some(GameResult::Winner(winner));
                } else if self.is_full() {
                    self.result = Some(GameResult::Draw);
                } else {
                    self.to_move = self.to_move.opponent();
                }
                true
            }
        }
    }

    fn result(&self) -> Option<GameResult> {
        self.result.clone()
    }

    fn copy(&self) -> Box<dyn RuleSet> {
        Box::new(self.clone())
    }
}

/// Creates tic-tac-toe games. Exposes a `time_limit_ms` parameter.
#[derive(Debug, Clone, Default)]
pub struct TicTacToeFactory {
    time_limit: Option<Duration>,
}

impl TicTacToeFactory {
    /// Creates a factory for untimed games.
    pub fn new() -> Self {
        Self::default()
    }

    fn time_limit_value(&self) -> String {
        self.time_limit
            .map_or_else(|| "none".to_string(), |limit| limit.as_millis().to_string())
    }
}

impl RuleFactory for TicTacToeFactory {
    fn name(&self) -> &str {
        "tictactoe"
    }

    fn seats(&self) -> usize {
        2
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::new(
            "time_limit_ms".to_string(),
            TIME_LIMITS.iter().map(ToString::to_string).collect(),
            self.time_limit_value(),
        )]
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        match (name, value) {
            ("time_limit_ms", "none") => self.time_limit = None,
            ("time_limit_ms", millis) => {
                self.time_limit = Some(Duration::from_millis(millis.parse()?));
            }
            (other, _) => anyhow::bail!("unknown parameter {other}"),
        }
        Ok(())
    }

    fn create(&self) -> anyhow::Result<Box<dyn RuleSet>> {
        Ok(Box::new(TicTacToe::new(self.time_limit)))
    }
}
