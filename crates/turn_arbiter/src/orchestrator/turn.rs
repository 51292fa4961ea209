//! The turn loop of one match, run on the confinement worker.

use super::MatchState;
use super::worker::{Confined, PlayRequest, PlayerBinding};
use crate::board::{Move, Seat};
use crate::config::MatchConfig;
use crate::control::{LimitBreak, MatchControl};
use crate::executors::Executors;
use crate::observer::Observer;
use crate::rules::{GameResult, Mechanics, RuleSet};
use crate::watchdog::{Budget, Call, Completion, Watchdog};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// How a match handler ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Outcome {
    /// The match never started.
    Rejected,
    /// The game reached a result.
    Finished,
    /// Stopped from outside.
    Interrupted,
    /// A player broke a limit outside its own move.
    Aborted,
}

impl Outcome {
    /// Whether the worker must stop taking commands after this match.
    pub(super) fn retires_worker(self) -> bool {
        matches!(self, Outcome::Interrupted | Outcome::Aborted)
    }
}

/// Why the turn loop returned.
enum End {
    Result(Option<GameResult>),
    Halted,
    Aborted(String),
}

/// Reports a limit break that ends the match.
fn abort(observer: &mut dyn Observer, seat: Seat, message: String) -> End {
    observer.on_limit_break(seat, &message);
    End::Aborted(message)
}

/// Time allowed for each kind of call in one match.
#[derive(Debug, Clone, Copy)]
struct Budgets {
    per_call: Budget,
    per_move: Budget,
}

impl Budgets {
    fn new(config: &MatchConfig, block_timeout: Option<Duration>, mechanics: &Mechanics) -> Self {
        let per_call = Budget::from(block_timeout).min(Budget::from(*config.timeout()));
        let per_move = match mechanics.move_time_limit() {
            Some(limit) => Budget::Within(*limit + *config.tolerance()),
            None => per_call,
        };
        Self { per_call, per_move }
    }
}

/// Result of a call raced against its watchdog and the stop signal.
enum Guarded<T> {
    Done(T),
    Violated(LimitBreak),
    Stopped,
}

async fn guarded<T>(
    control: &Arc<MatchControl>,
    budget: Budget,
    seat: Seat,
    call: Call,
    work: impl Future<Output = T>,
) -> Guarded<T> {
    let completion = Completion::new();
    let watchdog = Watchdog::arm(budget, seat, call, completion.clone(), control.clone());
    let output = tokio::select! {
        biased;
        output = work => Some(output),
        _ = control.interrupted() => None,
    };
    let on_time = completion.complete();
    watchdog.disarm();

    if control.stop_message().is_some() {
        return Guarded::Stopped;
    }
    match output {
        Some(output) if on_time => Guarded::Done(output),
        _ => Guarded::Violated(control.take_violation().unwrap_or_else(|| {
            LimitBreak::new(seat, format!("{call} missed its deadline"))
        })),
    }
}

/// Player names with duplicates told apart by seat.
fn effective_names(seats: &BTreeMap<Seat, PlayerBinding>) -> Vec<(Seat, String)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for binding in seats.values() {
        *counts.entry(binding.player.name()).or_default() += 1;
    }
    seats
        .iter()
        .map(|(seat, binding)| {
            let name = binding.player.name();
            if counts.get(name).copied().unwrap_or_default() > 1 {
                (*seat, format!("{name} ({seat})"))
            } else {
                (*seat, name.to_string())
            }
        })
        .collect()
}

/// Runs one match from setup to teardown.
#[instrument(skip_all)]
pub(super) async fn run(
    confined: &mut Confined,
    request: PlayRequest,
    state: &watch::Sender<MatchState>,
) -> Outcome {
    let PlayRequest {
        config,
        block_timeout,
        control,
        ack,
    } = request;

    let game = match confined.prepare() {
        Ok(game) => game,
        Err(error) => {
            warn!(%error, "Match rejected");
            state.send_replace(MatchState::Idle);
            let _ = ack.send(Err(error));
            if let Some(message) = control.seal() {
                confined.observer.on_interrupted(&message);
            }
            return Outcome::Rejected;
        }
    };
    state.send_replace(MatchState::Running);
    let _ = ack.send(Ok(()));

    let budgets = Budgets::new(&config, block_timeout, game.mechanics());
    debug!(?budgets, "Match budgets");
    let executors = Executors::from_config(&config);

    let end = turns(
        game,
        &mut confined.seats,
        confined.observer.as_mut(),
        &control,
        budgets,
        *config.min_time_between_moves(),
        executors.as_ref(),
    )
    .await;

    if let Some(executors) = &executors {
        executors.shutdown();
    }

    match (control.seal(), end) {
        (Some(message), _) => {
            info!(message = %message, "Match interrupted");
            confined.observer.on_interrupted(&message);
            state.send_replace(MatchState::Interrupted);
            Outcome::Interrupted
        }
        (None, End::Aborted(message)) => {
            warn!(message = %message, "Match aborted");
            confined.observer.on_aborted(&message);
            state.send_replace(MatchState::Interrupted);
            Outcome::Aborted
        }
        (None, End::Halted) => {
            warn!("Match halted without a stop request");
            confined.observer.on_aborted("match halted");
            state.send_replace(MatchState::Interrupted);
            Outcome::Aborted
        }
        (None, End::Result(result)) => {
            info!(?result, "Match finished");
            confined.observer.on_finished(result.as_ref());
            state.send_replace(MatchState::Finished);
            Outcome::Finished
        }
    }
}

async fn turns(
    mut game: Box<dyn RuleSet>,
    seats: &mut BTreeMap<Seat, PlayerBinding>,
    observer: &mut dyn Observer,
    control: &Arc<MatchControl>,
    budgets: Budgets,
    pause: Duration,
    executors: Option<&Executors>,
) -> End {
    let names = effective_names(seats);
    if let Some(executors) = executors {
        for binding in seats.values_mut() {
            binding.player.provide_executors(executors);
        }
    }
    observer.on_game_set(game.copy());
    observer.on_players(&names);

    for (&seat, binding) in seats.iter_mut() {
        let copy = game.copy();
        match guarded(
            control,
            budgets.per_call,
            seat,
            Call::SetGame,
            binding.player.set_game(copy),
        )
        .await
        {
            Guarded::Done(Ok(())) => {}
            Guarded::Done(Err(error)) => {
                return abort(observer, seat, format!("set_game failed: {error}"));
            }
            Guarded::Violated(violation) => {
                return abort(observer, violation.seat, violation.message);
            }
            Guarded::Stopped => return End::Halted,
        }
    }
    info!(players = names.len(), "Players set up");

    loop {
        if let Some(result) = game.result() {
            return End::Result(Some(result));
        }
        if control.stop_message().is_some() {
            return End::Halted;
        }

        let seat = game.current_seat();
        let legal = game.legal_moves();
        let Some(binding) = seats.get_mut(&seat) else {
            return abort(observer, seat, "no player bound to the seat to move".into());
        };

        debug!(seat, "Waiting for move");
        let (mv, forced) = match guarded(
            control,
            budgets.per_move,
            seat,
            Call::GetMove,
            binding.player.get_move(),
        )
        .await
        {
            Guarded::Stopped => return End::Halted,
            Guarded::Violated(violation) => (Move::Resign, Some(violation.message)),
            Guarded::Done(Err(error)) => (Move::Resign, Some(format!("get_move failed: {error}"))),
            Guarded::Done(Ok(mv)) if mv == Move::Resign || legal.contains(&mv) => (mv, None),
            Guarded::Done(Ok(mv)) => (Move::Resign, Some(format!("illegal move {mv}"))),
        };
        if let Some(message) = forced {
            warn!(seat, message = %message, "Forced resignation");
            observer.on_limit_break(seat, &message);
        }

        for (&other, binding) in seats.iter_mut() {
            match guarded(
                control,
                budgets.per_call,
                other,
                Call::Moved,
                binding.player.moved(seat, &mv),
            )
            .await
            {
                Guarded::Done(Ok(())) => {}
                Guarded::Done(Err(error)) => {
                    return abort(observer, other, format!("moved failed: {error}"));
                }
                Guarded::Violated(violation) => {
                    return abort(observer, violation.seat, violation.message);
                }
                Guarded::Stopped => return End::Halted,
            }
        }
        observer.on_moved(seat, &mv);

        if !game.apply_move(&mv) {
            return abort(observer, seat, format!("rules rejected {mv}"));
        }

        if game.result().is_none() && !pause.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = control.stopped() => return End::Halted,
            }
        }
    }
}
