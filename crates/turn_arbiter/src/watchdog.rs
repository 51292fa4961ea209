//! Deadline watchdogs for confinement-worker calls.
//!
//! A watchdog never calls into game or player objects. It only decides a
//! [`Completion`] cell and records a [`LimitBreak`] on the match control,
//! which the turn loop picks up at its next check.

use crate::board::Seat;
use crate::control::{LimitBreak, MatchControl};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// Time allowed for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Budget {
    /// No policing at all.
    #[default]
    Unbounded,
    /// The call must finish within the duration; zero means it must already
    /// be done when the watchdog is armed.
    Within(Duration),
}

impl Budget {
    /// Negative milliseconds mean unbounded.
    #[cfg(test)]
    pub(crate) fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(millis) => Budget::Within(Duration::from_millis(millis)),
            Err(_) => Budget::Unbounded,
        }
    }

    /// The tighter of two budgets.
    pub(crate) fn min(self, other: Budget) -> Budget {
        match (self, other) {
            (Budget::Within(a), Budget::Within(b)) => Budget::Within(a.min(b)),
            (Budget::Within(a), Budget::Unbounded) | (Budget::Unbounded, Budget::Within(a)) => {
                Budget::Within(a)
            }
            (Budget::Unbounded, Budget::Unbounded) => Budget::Unbounded,
        }
    }
}

impl From<Option<Duration>> for Budget {
    fn from(limit: Option<Duration>) -> Self {
        limit.map_or(Budget::Unbounded, Budget::Within)
    }
}

/// Confinement-worker call a watchdog polices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub(crate) enum Call {
    /// Handing a player its copy of the game.
    #[strum(serialize = "set_game")]
    SetGame,
    /// Asking a player for its move.
    #[strum(serialize = "get_move")]
    GetMove,
    /// Telling a player about a move.
    #[strum(serialize = "moved")]
    Moved,
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const FIRED: u8 = 2;

/// Done flag shared by a guarded call and its watchdog.
///
/// Exactly one side wins: the call completes first, or the watchdog fires
/// first.
#[derive(Debug, Clone, Default)]
pub(crate) struct Completion(Arc<AtomicU8>);

impl Completion {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks the call done. False if the watchdog fired first.
    pub(crate) fn complete(&self) -> bool {
        match self
            .0
            .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == COMPLETED,
        }
    }

    fn fire(&self) -> bool {
        self.0
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[cfg(test)]
    fn is_fired(&self) -> bool {
        self.0.load(Ordering::Acquire) == FIRED
    }
}

/// Timer bound to one guarded call.
#[derive(Debug)]
pub(crate) struct Watchdog {
    cancel: Option<oneshot::Sender<()>>,
}

impl Watchdog {
    /// Starts policing `call` for `seat`.
    ///
    /// With a zero budget the violation is recorded before this returns.
    #[instrument(skip(completion, control))]
    pub(crate) fn arm(
        budget: Budget,
        seat: Seat,
        call: Call,
        completion: Completion,
        control: Arc<MatchControl>,
    ) -> Self {
        let limit = match budget {
            Budget::Unbounded => return Self { cancel: None },
            Budget::Within(limit) => limit,
        };
        if limit.is_zero() {
            report(&completion, &control, seat, call, limit);
            return Self { cancel: None };
        }

        let (cancel, cancelled) = oneshot::channel();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = cancelled => {
                    debug!(seat, %call, "Watchdog disarmed");
                }
            }
            report(&completion, &control, seat, call, limit);
        });
        Self {
            cancel: Some(cancel),
        }
    }

    /// Wakes the timer so it exits without waiting out the budget.
    pub(crate) fn disarm(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

fn report(completion: &Completion, control: &MatchControl, seat: Seat, call: Call, limit: Duration) {
    if completion.fire() {
        let message = format!("{call} exceeded {} ms", limit.as_millis());
        warn!(seat, %call, budget_ms = limit.as_millis() as u64, "Deadline violated");
        control.violate(LimitBreak::new(seat, message));
    }
}
