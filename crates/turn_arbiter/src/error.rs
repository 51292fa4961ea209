//! Error types for configuration and turn-state violations.

use derive_more::{Display, Error};
use tracing::instrument;

/// What went wrong with a call into the orchestrator or a resolution tree.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum MatchErrorKind {
    /// The call is not allowed in the current state.
    #[display("illegal state: {}", _0)]
    IllegalState(String),

    /// An argument is out of range or not in its allowed set.
    #[display("illegal argument: {}", _0)]
    IllegalArgument(String),
}

/// Error returned synchronously to the caller, with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("{} at {}:{}", kind, file, line)]
pub struct MatchError {
    /// Error category and message.
    pub kind: MatchErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl MatchError {
    /// Creates a new error with caller location tracking.
    #[track_caller]
    #[instrument]
    pub fn new(kind: MatchErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Creates an [`MatchErrorKind::IllegalState`] error.
    #[track_caller]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(MatchErrorKind::IllegalState(message.into()))
    }

    /// Creates an [`MatchErrorKind::IllegalArgument`] error.
    #[track_caller]
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(MatchErrorKind::IllegalArgument(message.into()))
    }

    /// True for state errors.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self.kind, MatchErrorKind::IllegalState(_))
    }

    /// True for argument errors.
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self.kind, MatchErrorKind::IllegalArgument(_))
    }
}
