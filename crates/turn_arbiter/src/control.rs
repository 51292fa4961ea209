//! Per-match signalling between the turn loop, watchdogs and `stop()`.
//!
//! A fresh [`MatchControl`] is created for every match, so nothing a
//! watchdog or a stop request leaves behind can reach the next match.

use crate::board::Seat;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A deadline or rules violation attributed to one seat.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub(crate) struct LimitBreak {
    pub(crate) seat: Seat,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Default)]
struct Signals {
    stop: Option<String>,
    violation: Option<LimitBreak>,
    sealed: bool,
    exited: bool,
}

/// Shared state of one running match.
#[derive(Debug)]
pub(crate) struct MatchControl {
    signals: watch::Sender<Signals>,
}

impl MatchControl {
    pub(crate) fn new() -> Self {
        let (signals, _) = watch::channel(Signals::default());
        Self { signals }
    }

    /// Raises the stop flag. False if the match outcome is already decided
    /// or a stop was already requested.
    pub(crate) fn request_stop(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.signals.send_if_modified(|signals| {
            if signals.sealed || signals.stop.is_some() {
                return false;
            }
            debug!(message = %message, "Stop requested");
            signals.stop = Some(message);
            true
        })
    }

    /// Records a violation and wakes the turn loop.
    pub(crate) fn violate(&self, violation: LimitBreak) {
        self.signals.send_if_modified(|signals| {
            if signals.violation.is_some() {
                return false;
            }
            warn!(seat = violation.seat, message = %violation.message, "Violation recorded");
            signals.violation = Some(violation);
            true
        });
    }

    /// Takes the pending violation, if any.
    pub(crate) fn take_violation(&self) -> Option<LimitBreak> {
        let mut taken = None;
        self.signals.send_if_modified(|signals| {
            taken = signals.violation.take();
            false
        });
        taken
    }

    pub(crate) fn stop_message(&self) -> Option<String> {
        self.signals.borrow().stop.clone()
    }

    #[cfg(test)]
    pub(crate) fn has_violation(&self) -> bool {
        self.signals.borrow().violation.is_some()
    }

    /// Resolves once a stop was requested.
    pub(crate) async fn stopped(&self) {
        let mut signals = self.signals.subscribe();
        let _ = signals.wait_for(|s| s.stop.is_some()).await;
    }

    /// Resolves once a stop was requested or a violation recorded.
    pub(crate) async fn interrupted(&self) {
        let mut signals = self.signals.subscribe();
        let _ = signals
            .wait_for(|s| s.stop.is_some() || s.violation.is_some())
            .await;
    }

    /// Decides the outcome: later stop requests are refused. Returns the
    /// stop message if one arrived first.
    pub(crate) fn seal(&self) -> Option<String> {
        let mut stop = None;
        self.signals.send_if_modified(|signals| {
            signals.sealed = true;
            stop = signals.stop.clone();
            false
        });
        stop
    }

    pub(crate) fn mark_exited(&self) {
        self.signals.send_modify(|signals| {
            signals.sealed = true;
            signals.exited = true;
        });
    }

    /// Resolves once the turn loop has exited.
    pub(crate) async fn exited(&self) {
        let mut signals = self.signals.subscribe();
        let _ = signals.wait_for(|s| s.exited).await;
    }
}
