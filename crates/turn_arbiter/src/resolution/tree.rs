//! Incremental move selection over a compressed prefix tree.

use super::arena::{Arena, NodeId, ROOT};
use crate::board::{Action, ActionList, Applied, Board, Direction, Move, Piece, Position};
use crate::error::MatchError;
use crate::rules::RuleSet;
use std::collections::BTreeSet;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// Board changes of an edge, one entry per action on the edge.
type Displacement = Vec<Applied>;

/// One player-turn's move resolution session.
///
/// Built from the legal moves of the current situation, the tree turns a
/// sequence of board selections into exactly one terminal choice: a complete
/// move, a pass, or a resignation. The choice is delivered through the
/// `oneshot` sender handed to [`ResolutionTree::new`]. After that, or after
/// [`ResolutionTree::interrupt`], or once the receiving side has gone away,
/// every method fails with an illegal-state error.
#[derive(Debug)]
pub struct ResolutionTree {
    arena: Arena,
    current: NodeId,
    selection: BTreeSet<Position>,
    candidates: Vec<NodeId>,
    board: Board,
    descents: Vec<Displacement>,
    positions: BTreeSet<Position>,
    may_pass: bool,
    reply: Option<oneshot::Sender<Move>>,
    interrupted: bool,
}

impl ResolutionTree {
    /// Builds the tree for `legal_moves` on `board`.
    ///
    /// `positions` is the full set of squares; selections outside it are
    /// rejected. The root's forced prefix is applied to the working board
    /// straight away.
    #[instrument(skip_all, fields(moves = legal_moves.len()))]
    pub fn new(
        legal_moves: &[Move],
        board: Board,
        positions: BTreeSet<Position>,
        reply: oneshot::Sender<Move>,
    ) -> Self {
        let may_pass = legal_moves.contains(&Move::Pass);
        let sequences: Vec<ActionList> = legal_moves
            .iter()
            .filter_map(|mv| mv.actions().cloned())
            .collect();
        let arena = Arena::build(&sequences);
        let mut board = board;
        for action in arena.actions(ROOT) {
            board.apply(action);
        }
        debug!(may_pass, sequences = sequences.len(), "Resolution tree ready");
        Self {
            arena,
            current: ROOT,
            selection: BTreeSet::new(),
            candidates: Vec::new(),
            board,
            descents: Vec::new(),
            positions,
            may_pass,
            reply: Some(reply),
            interrupted: false,
        }
    }

    /// Builds the tree for the current situation of `game`.
    pub fn for_game(game: &dyn RuleSet, reply: oneshot::Sender<Move>) -> Self {
        let situation = game.situation();
        Self::new(
            &game.legal_moves(),
            situation.board().clone(),
            game.mechanics().positions().clone(),
            reply,
        )
    }

    fn ensure_open(&self) -> Result<(), MatchError> {
        if self.interrupted {
            return Err(MatchError::illegal_state("resolution was interrupted"));
        }
        match &self.reply {
            None => Err(MatchError::illegal_state("a terminal choice was already made")),
            Some(reply) if reply.is_closed() => {
                Err(MatchError::illegal_state("nobody is waiting for this move any more"))
            }
            Some(_) => Ok(()),
        }
    }

    /// Actions the last step added.
    ///
    /// At the root this is the forced common prefix of all moves, or `None`
    /// if the moves diverge immediately.
    #[instrument(skip(self))]
    pub fn sub_move(&self) -> Result<Option<ActionList>, MatchError> {
        self.ensure_open()?;
        let edge = self.arena.edge(self.current);
        if self.current == ROOT && edge.is_empty() {
            return Ok(None);
        }
        Ok(Some(edge.to_vec()))
    }

    /// Suffix of each child relative to the current node.
    #[instrument(skip(self))]
    pub fn children_sub_moves(&self) -> Result<Vec<ActionList>, MatchError> {
        self.ensure_open()?;
        Ok(self
            .arena
            .children(self.current)
            .iter()
            .map(|&child| self.arena.edge(child).to_vec())
            .collect())
    }

    /// Replaces the selection and returns every legal move whose next
    /// action is picked by exactly these squares.
    #[instrument(skip(self, positions))]
    pub fn select(
        &mut self,
        positions: impl IntoIterator<Item = Position>,
    ) -> Result<Vec<ActionList>, MatchError> {
        self.ensure_open()?;
        let requested: Vec<Position> = positions.into_iter().collect();
        if requested.is_empty() {
            return Err(MatchError::illegal_argument("selection is empty"));
        }
        let selection: BTreeSet<Position> = requested.iter().copied().collect();
        if selection.len() != requested.len() {
            return Err(MatchError::illegal_argument("selection repeats a position"));
        }
        if let Some(outside) = selection.iter().find(|p| !self.positions.contains(p)) {
            return Err(MatchError::illegal_argument(format!(
                "{outside} is not on the board"
            )));
        }

        self.candidates = self
            .arena
            .children(self.current)
            .iter()
            .copied()
            .filter(|&child| {
                self.arena
                    .next_action(child)
                    .is_some_and(|action| action.selection() == selection)
            })
            .collect();
        self.selection = selection;
        debug!(candidates = self.candidates.len(), "Selection updated");
        Ok(self.candidate_moves(&self.candidates))
    }

    /// Legal moves whose next action covers the selection and more.
    #[instrument(skip(self))]
    pub fn quasi_selected(&self) -> Result<Vec<ActionList>, MatchError> {
        self.ensure_open()?;
        if self.selection.is_empty() {
            return Ok(Vec::new());
        }
        let partial: Vec<NodeId> = self
            .arena
            .children(self.current)
            .iter()
            .copied()
            .filter(|&child| {
                self.arena.next_action(child).is_some_and(|action| {
                    let covered = action.selection();
                    covered.len() > self.selection.len() && covered.is_superset(&self.selection)
                })
            })
            .collect();
        Ok(self.candidate_moves(&partial))
    }

    /// Pieces that tell the current candidates apart; `None` means removal.
    ///
    /// Empty when nothing is selected or when a slide or jump is among the
    /// candidates, since those are told apart by direction or landing square.
    #[instrument(skip(self))]
    pub fn selection_pieces(&self) -> Result<Vec<Option<Piece>>, MatchError> {
        self.ensure_open()?;
        let mut pieces: Vec<Option<Piece>> = Vec::new();
        for &child in &self.candidates {
            let entry = match self.arena.next_action(child) {
                Some(Action::Remove { .. }) => None,
                Some(Action::Add { piece, .. } | Action::Swap { piece, .. }) => Some(piece.clone()),
                _ => return Ok(Vec::new()),
            };
            if !pieces.contains(&entry) {
                pieces.push(entry);
            }
        }
        Ok(pieces)
    }

    /// Descends into the candidate that adds or swaps in `piece`, or that
    /// removes when `piece` is `None`. Returns the consumed actions.
    #[instrument(skip(self))]
    pub fn do_selection(&mut self, piece: Option<&Piece>) -> Result<ActionList, MatchError> {
        self.descend_where(|action| match (action, piece) {
            (Action::Remove { .. }, None) => true,
            (Action::Add { piece: p, .. } | Action::Swap { piece: p, .. }, Some(wanted)) => {
                p == wanted
            }
            _ => false,
        })
    }

    /// Descends into the candidate sliding `steps` squares toward `direction`.
    #[instrument(skip(self))]
    pub fn move_selection(
        &mut self,
        direction: Direction,
        steps: u32,
    ) -> Result<ActionList, MatchError> {
        self.descend_where(|action| {
            matches!(action, Action::Move { direction: d, steps: s, .. } if *d == direction && *s == steps)
        })
    }

    /// Descends into the candidate jumping to `destination`.
    #[instrument(skip(self))]
    pub fn jump_selection(&mut self, destination: Position) -> Result<ActionList, MatchError> {
        self.descend_where(|action| matches!(action, Action::Jump { to, .. } if *to == destination))
    }

    fn descend_where(
        &mut self,
        predicate: impl Fn(&Action) -> bool,
    ) -> Result<ActionList, MatchError> {
        self.ensure_open()?;
        if self.candidates.is_empty() {
            return Err(MatchError::illegal_state("no selected candidates"));
        }
        let child = self
            .candidates
            .iter()
            .copied()
            .find(|&child| self.arena.next_action(child).is_some_and(&predicate))
            .ok_or_else(|| MatchError::illegal_argument("no candidate matches that choice"))?;

        let edge = self.arena.edge(child).to_vec();
        let displaced: Displacement = edge.iter().map(|action| self.board.apply(action)).collect();
        self.descents.push(displaced);
        self.current = child;
        self.clear_selection();
        debug!(depth = self.descents.len(), "Descended");
        Ok(edge)
    }

    /// Ascends one level and returns the actions that restore the board as
    /// it was before the last descent.
    #[instrument(skip(self))]
    pub fn back(&mut self) -> Result<ActionList, MatchError> {
        self.ensure_open()?;
        let parent = self
            .arena
            .parent(self.current)
            .ok_or_else(|| MatchError::illegal_state("already at the root"))?;
        let displaced = self
            .descents
            .pop()
            .ok_or_else(|| MatchError::illegal_state("no descent to undo"))?;

        let edge = self.arena.edge(self.current).to_vec();
        let mut inverse = Vec::new();
        for (action, applied) in edge.iter().zip(displaced.iter()).rev() {
            for undo in action.inverse(applied) {
                self.board.apply(&undo);
                inverse.push(undo);
            }
        }
        self.current = parent;
        self.clear_selection();
        debug!(depth = self.descents.len(), "Ascended");
        Ok(inverse)
    }

    /// True when the current node has no children.
    pub fn is_final(&self) -> Result<bool, MatchError> {
        self.ensure_open()?;
        Ok(self.arena.children(self.current).is_empty())
    }

    /// True when the actions selected so far form a legal move.
    pub fn is_complete(&self) -> Result<bool, MatchError> {
        self.ensure_open()?;
        Ok(self.arena.is_complete(self.current))
    }

    /// Whether passing is legal this turn.
    pub fn may_pass(&self) -> Result<bool, MatchError> {
        self.ensure_open()?;
        Ok(self.may_pass)
    }

    /// Working board after the actions selected so far.
    pub fn board(&self) -> Result<&Board, MatchError> {
        self.ensure_open()?;
        Ok(&self.board)
    }

    /// Currently selected squares.
    pub fn selection(&self) -> &BTreeSet<Position> {
        &self.selection
    }

    /// Submits the selected move.
    #[instrument(skip(self))]
    pub fn make_move(&mut self) -> Result<(), MatchError> {
        self.ensure_open()?;
        if !self.arena.is_complete(self.current) {
            return Err(MatchError::illegal_state("the selected actions are not a complete move"));
        }
        let actions = self.arena.actions(self.current).clone();
        self.emit(Move::Actions(actions))
    }

    /// Passes the turn, if the rules allow it.
    #[instrument(skip(self))]
    pub fn pass(&mut self) -> Result<(), MatchError> {
        self.ensure_open()?;
        if !self.may_pass {
            return Err(MatchError::illegal_state("passing is not legal now"));
        }
        self.emit(Move::Pass)
    }

    /// Resigns the match.
    #[instrument(skip(self))]
    pub fn resign(&mut self) -> Result<(), MatchError> {
        self.ensure_open()?;
        self.emit(Move::Resign)
    }

    /// Marks the session dead without making a choice.
    pub fn interrupt(&mut self) {
        if !self.interrupted {
            warn!("Resolution interrupted");
        }
        self.interrupted = true;
    }

    fn emit(&mut self, mv: Move) -> Result<(), MatchError> {
        let reply = self
            .reply
            .take()
            .ok_or_else(|| MatchError::illegal_state("a terminal choice was already made"))?;
        info!(mv = %mv, "Terminal choice made");
        reply
            .send(mv)
            .map_err(|_| MatchError::illegal_state("nobody is waiting for this move any more"))
    }

    fn clear_selection(&mut self) {
        self.selection.clear();
        self.candidates.clear();
    }

    fn candidate_moves(&self, nodes: &[NodeId]) -> Vec<ActionList> {
        nodes
            .iter()
            .flat_map(|&node| self.arena.moves_under(node))
            .collect()
    }
}
