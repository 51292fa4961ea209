//! Board vocabulary shared by rule sets, players and the resolution tree.
//!
//! Moves are first-class values: a legal move is an ordered list of
//! primitive [`Action`]s, or one of the [`Move::Pass`] / [`Move::Resign`]
//! markers that never take part in move resolution.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

/// A 1-based turn-order slot.
pub type Seat = usize;

/// Ordered primitive board edits composing one legal move.
pub type ActionList = Vec<Action>;

/// A square on the board, addressed by grid column and row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_new::new,
)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row, growing southward.
    pub y: i32,
}

impl Position {
    /// Returns the square reached by walking `steps` squares in `direction`.
    ///
    /// Coordinates saturate at the bounds of `i32`.
    pub fn offset(self, direction: Direction, steps: u32) -> Self {
        let (dx, dy) = direction.delta();
        let steps = i32::try_from(steps).unwrap_or(i32::MAX);
        Self::new(
            self.x.saturating_add(dx.saturating_mul(steps)),
            self.y.saturating_add(dy.saturating_mul(steps)),
        )
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Compass direction for sliding moves.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Direction {
    /// Toward row 0.
    North,
    /// Toward row 0 and the last column.
    NorthEast,
    /// Toward the last column.
    East,
    /// Away from row 0, toward the last column.
    SouthEast,
    /// Away from row 0.
    South,
    /// Away from row 0, toward column 0.
    SouthWest,
    /// Toward column 0.
    West,
    /// Toward row 0 and column 0.
    NorthWest,
}

impl Direction {
    /// Unit `(dx, dy)` step for this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }

    /// The direction pointing the other way.
    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
        }
    }
}

/// A piece model: its species and, for owned pieces, the seat that owns it.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_getters::Getters,
)]
pub struct Piece {
    species: String,
    owner: Option<Seat>,
}

impl Piece {
    /// Creates a piece owned by `owner`.
    pub fn new(species: impl Into<String>, owner: Seat) -> Self {
        Self {
            species: species.into(),
            owner: Some(owner),
        }
    }

    /// Creates a piece nobody owns.
    pub fn neutral(species: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            owner: None,
        }
    }
}

impl std::fmt::Display for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner {
            Some(owner) => write!(f, "{}#{}", self.species, owner),
            None => write!(f, "{}", self.species),
        }
    }
}

/// Kind of a primitive action, for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ActionKind {
    /// Pieces placed on empty squares.
    Add,
    /// Pieces taken off the board.
    Remove,
    /// Pieces slid along a direction.
    Move,
    /// One piece hopping to a landing square.
    Jump,
    /// Pieces replaced by another piece model.
    Swap,
}

/// One primitive board operation.
///
/// Position lists are kept sorted and deduplicated so that equal operations
/// compare equal regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Place `piece` on every position.
    Add {
        /// Target squares.
        positions: Vec<Position>,
        /// Piece placed on each square.
        piece: Piece,
    },
    /// Remove whatever stands on every position.
    Remove {
        /// Target squares.
        positions: Vec<Position>,
    },
    /// Slide the pieces on every position `steps` squares along `direction`.
    Move {
        /// Source squares.
        positions: Vec<Position>,
        /// Slide direction.
        direction: Direction,
        /// Number of squares.
        steps: u32,
    },
    /// Hop the piece on `from` to `to`.
    Jump {
        /// Source square.
        from: Position,
        /// Landing square.
        to: Position,
    },
    /// Replace the pieces on every position with `piece`.
    Swap {
        /// Target squares.
        positions: Vec<Position>,
        /// Replacement piece.
        piece: Piece,
    },
}

fn normalized(positions: impl IntoIterator<Item = Position>) -> Vec<Position> {
    positions
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl Action {
    /// Add `piece` at `positions`.
    pub fn add(positions: impl IntoIterator<Item = Position>, piece: Piece) -> Self {
        Action::Add {
            positions: normalized(positions),
            piece,
        }
    }

    /// Remove the pieces at `positions`.
    pub fn remove(positions: impl IntoIterator<Item = Position>) -> Self {
        Action::Remove {
            positions: normalized(positions),
        }
    }

    /// Slide the pieces at `positions`.
    pub fn slide(
        positions: impl IntoIterator<Item = Position>,
        direction: Direction,
        steps: u32,
    ) -> Self {
        Action::Move {
            positions: normalized(positions),
            direction,
            steps,
        }
    }

    /// Jump from `from` to `to`.
    pub fn jump(from: Position, to: Position) -> Self {
        Action::Jump { from, to }
    }

    /// Swap the pieces at `positions` for `piece`.
    pub fn swap(positions: impl IntoIterator<Item = Position>, piece: Piece) -> Self {
        Action::Swap {
            positions: normalized(positions),
            piece,
        }
    }

    /// Returns the action's kind.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Add { .. } => ActionKind::Add,
            Action::Remove { .. } => ActionKind::Remove,
            Action::Move { .. } => ActionKind::Move,
            Action::Jump { .. } => ActionKind::Jump,
            Action::Swap { .. } => ActionKind::Swap,
        }
    }

    /// Squares a user selects to pick this action.
    ///
    /// A jump is picked by its source alone; the landing square is chosen
    /// afterwards.
    pub fn selection(&self) -> BTreeSet<Position> {
        match self {
            Action::Add { positions, .. }
            | Action::Remove { positions }
            | Action::Move { positions, .. }
            | Action::Swap { positions, .. } => positions.iter().copied().collect(),
            Action::Jump { from, .. } => BTreeSet::from([*from]),
        }
    }

    /// Piece placed by an add or swap.
    pub fn piece(&self) -> Option<&Piece> {
        match self {
            Action::Add { piece, .. } | Action::Swap { piece, .. } => Some(piece),
            _ => None,
        }
    }

    /// Builds the actions that undo this one.
    ///
    /// `applied` is the record returned by [`Board::apply`] for this action.
    pub fn inverse(&self, applied: &Applied) -> Vec<Action> {
        let displaced = applied.displaced();
        match self {
            Action::Add { positions, .. } => {
                let mut undo = vec![Action::remove(positions.iter().copied())];
                undo.extend(restore(displaced));
                undo
            }
            Action::Remove { .. } => restore(displaced),
            Action::Move {
                positions,
                direction,
                steps,
            } => {
                let landed: Vec<Position> = positions
                    .iter()
                    .filter(|p| !applied.vacant().contains(p))
                    .map(|p| p.offset(*direction, *steps))
                    .collect();
                let mut undo = Vec::new();
                if !landed.is_empty() {
                    undo.push(Action::slide(landed, direction.opposite(), *steps));
                }
                undo.extend(restore(displaced));
                undo
            }
            Action::Jump { from, to } => {
                if applied.vacant().contains(from) {
                    return Vec::new();
                }
                let mut undo = vec![Action::jump(*to, *from)];
                undo.extend(restore(displaced));
                undo
            }
            Action::Swap { positions, .. } => {
                let vacant: Vec<Position> = positions
                    .iter()
                    .copied()
                    .filter(|p| !displaced.iter().any(|(q, _)| q == p))
                    .collect();
                let mut undo: Vec<Action> = group_by_piece(displaced)
                    .into_iter()
                    .map(|(piece, positions)| Action::swap(positions, piece))
                    .collect();
                if !vacant.is_empty() {
                    undo.push(Action::remove(vacant));
                }
                undo
            }
        }
    }
}

fn group_by_piece(displaced: &[(Position, Piece)]) -> BTreeMap<Piece, Vec<Position>> {
    let mut groups: BTreeMap<Piece, Vec<Position>> = BTreeMap::new();
    for (position, piece) in displaced {
        groups.entry(piece.clone()).or_default().push(*position);
    }
    groups
}

fn restore(displaced: &[(Position, Piece)]) -> Vec<Action> {
    group_by_piece(displaced)
        .into_iter()
        .map(|(piece, positions)| Action::add(positions, piece))
        .collect()
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let list = |positions: &[Position]| {
            positions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        match self {
            Action::Add { positions, piece } => write!(f, "ADD {} {}", piece, list(positions)),
            Action::Remove { positions } => write!(f, "REMOVE {}", list(positions)),
            Action::Move {
                positions,
                direction,
                steps,
            } => write!(f, "MOVE {} {} x{}", list(positions), direction, steps),
            Action::Jump { from, to } => write!(f, "JUMP {} -> {}", from, to),
            Action::Swap { positions, piece } => {
                write!(f, "SWAP {} {}", list(positions), piece)
            }
        }
    }
}

/// A move as submitted by a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    /// A sequence of board edits.
    Actions(ActionList),
    /// Skip the turn.
    Pass,
    /// Give up the match.
    Resign,
}

impl Move {
    /// The action list of an ordinary move.
    pub fn actions(&self) -> Option<&ActionList> {
        match self {
            Move::Actions(actions) => Some(actions),
            _ => None,
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Move::Actions(actions) => {
                let parts: Vec<String> = actions.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Move::Pass => write!(f, "PASS"),
            Move::Resign => write!(f, "RESIGN"),
        }
    }
}

/// What applying one action did to a board, enough to undo it exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, derive_getters::Getters)]
pub struct Applied {
    /// Pieces taken off the board or overwritten, with their squares.
    displaced: Vec<(Position, Piece)>,
    /// Slide or jump sources that held no piece.
    vacant: Vec<Position>,
}

/// Piece placement on a board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(Position, Piece)>", into = "Vec<(Position, Piece)>")]
pub struct Board {
    pieces: BTreeMap<Position, Piece>,
}

impl From<Vec<(Position, Piece)>> for Board {
    fn from(pieces: Vec<(Position, Piece)>) -> Self {
        Self {
            pieces: pieces.into_iter().collect(),
        }
    }
}

impl From<Board> for Vec<(Position, Piece)> {
    fn from(board: Board) -> Self {
        board.pieces.into_iter().collect()
    }
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Piece standing on `position`.
    pub fn get(&self, position: Position) -> Option<&Piece> {
        self.pieces.get(&position)
    }

    /// Puts `piece` on `position`, returning what stood there.
    pub fn set(&mut self, position: Position, piece: Piece) -> Option<Piece> {
        self.pieces.insert(position, piece)
    }

    /// True when no piece stands on `position`.
    pub fn is_empty(&self, position: Position) -> bool {
        !self.pieces.contains_key(&position)
    }

    /// All occupied squares with their pieces.
    pub fn pieces(&self) -> &BTreeMap<Position, Piece> {
        &self.pieces
    }

    /// Applies one action, recording every piece it took off or overwrote.
    #[instrument(skip(self), fields(kind = %action.kind()))]
    pub fn apply(&mut self, action: &Action) -> Applied {
        let mut displaced = Vec::new();
        let mut vacant = Vec::new();
        match action {
            Action::Add { positions, piece } => {
                for position in positions {
                    if let Some(old) = self.pieces.insert(*position, piece.clone()) {
                        displaced.push((*position, old));
                    }
                }
            }
            Action::Remove { positions } => {
                for position in positions {
                    if let Some(old) = self.pieces.remove(position) {
                        displaced.push((*position, old));
                    }
                }
            }
            Action::Move {
                positions,
                direction,
                steps,
            } => {
                // Lift every piece first so overlapping slides do not clobber each other.
                let mut lifted = Vec::new();
                for position in positions {
                    match self.pieces.remove(position) {
                        Some(piece) => lifted.push((*position, piece)),
                        None => vacant.push(*position),
                    }
                }
                for (position, piece) in lifted {
                    let landing = position.offset(*direction, *steps);
                    if let Some(old) = self.pieces.insert(landing, piece) {
                        displaced.push((landing, old));
                    }
                }
            }
            Action::Jump { from, to } => match self.pieces.remove(from) {
                Some(piece) => {
                    if let Some(old) = self.pieces.insert(*to, piece) {
                        displaced.push((*to, old));
                    }
                }
                None => vacant.push(*from),
            },
            Action::Swap { positions, piece } => {
                for position in positions {
                    if let Some(old) = self.pieces.insert(*position, piece.clone()) {
                        displaced.push((*position, old));
                    }
                }
            }
        }
        Applied { displaced, vacant }
    }
}

/// Snapshot of a game position: piece placement and whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new, derive_getters::Getters)]
pub struct Situation {
    board: Board,
    seat: Seat,
}
