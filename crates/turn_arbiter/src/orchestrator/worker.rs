//! The confinement worker and the configuration it owns.

use super::MatchState;
use super::turn;
use crate::board::Seat;
use crate::config::MatchConfig;
use crate::control::MatchControl;
use crate::error::MatchError;
use crate::observer::Observer;
use crate::players::{Player, PlayerFactory};
use crate::rules::{Parameter, RuleFactory, RuleSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub(super) type Ack = oneshot::Sender<Result<(), MatchError>>;

/// A player bound to a seat, with the factory that made it, if any.
pub(super) struct PlayerBinding {
    pub(super) player: Box<dyn Player>,
    factory: Option<Box<dyn PlayerFactory>>,
}

/// Everything that may only be touched from the worker.
pub(super) struct Confined {
    pub(super) observer: Box<dyn Observer>,
    rules: Option<Box<dyn RuleFactory>>,
    pub(super) seats: BTreeMap<Seat, PlayerBinding>,
}

/// Match start request.
#[derive(derive_new::new)]
pub(super) struct PlayRequest {
    pub(super) config: MatchConfig,
    pub(super) block_timeout: Option<Duration>,
    pub(super) control: Arc<MatchControl>,
    pub(super) ack: Ack,
}

/// Work submitted to the worker.
#[derive(strum::Display)]
pub(super) enum Command {
    SetRules {
        factory: Box<dyn RuleFactory>,
        ack: Ack,
    },
    SetRuleParameter {
        name: String,
        value: String,
        ack: Ack,
    },
    SetPlayer {
        seat: Seat,
        player: Box<dyn Player>,
        ack: Ack,
    },
    SetPlayerFactory {
        seat: Seat,
        factory: Box<dyn PlayerFactory>,
        ack: Ack,
    },
    SetPlayerParameter {
        seat: Seat,
        name: String,
        value: String,
        ack: Ack,
    },
    Reset {
        ack: Ack,
    },
    Play(PlayRequest),
}

fn check_parameter(parameters: &[Parameter], name: &str, value: &str) -> Result<(), MatchError> {
    let parameter = parameters
        .iter()
        .find(|parameter| parameter.name() == name)
        .ok_or_else(|| MatchError::illegal_argument(format!("unknown parameter {name}")))?;
    if !parameter.accepts(value) {
        return Err(MatchError::illegal_argument(format!(
            "{value} is not an allowed value of {name} (allowed: {})",
            parameter.allowed().join(", ")
        )));
    }
    Ok(())
}

impl Confined {
    pub(super) fn new(observer: Box<dyn Observer>) -> Self {
        Self {
            observer,
            rules: None,
            seats: BTreeMap::new(),
        }
    }

    fn check_seat(&self, seat: Seat) -> Result<(), MatchError> {
        let rules = self
            .rules
            .as_ref()
            .ok_or_else(|| MatchError::illegal_state("set the rules before binding players"))?;
        if seat == 0 || seat > rules.seats() {
            return Err(MatchError::illegal_argument(format!(
                "seat {seat} is outside 1..={}",
                rules.seats()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, factory), fields(game = %factory.name()))]
    fn set_rules(&mut self, factory: Box<dyn RuleFactory>) -> Result<(), MatchError> {
        let seats = factory.seats();
        self.seats.retain(|seat, _| {
            let keep = *seat <= seats;
            if !keep {
                debug!(seat, "Dropping binding for a seat the game lacks");
            }
            keep
        });
        self.rules = Some(factory);
        Ok(())
    }

    #[instrument(skip(self))]
    fn set_rule_parameter(&mut self, name: &str, value: &str) -> Result<(), MatchError> {
        let rules = self
            .rules
            .as_mut()
            .ok_or_else(|| MatchError::illegal_state("no rules set"))?;
        check_parameter(&rules.parameters(), name, value)?;
        rules
            .set_parameter(name, value)
            .map_err(|e| MatchError::illegal_state(format!("rules rejected {name}={value}: {e}")))
    }

    #[instrument(skip(self, player), fields(player = %player.name()))]
    fn set_player(&mut self, seat: Seat, player: Box<dyn Player>) -> Result<(), MatchError> {
        self.check_seat(seat)?;
        self.seats.insert(
            seat,
            PlayerBinding {
                player,
                factory: None,
            },
        );
        Ok(())
    }

    #[instrument(skip(self, factory), fields(factory = %factory.name()))]
    fn set_player_factory(
        &mut self,
        seat: Seat,
        factory: Box<dyn PlayerFactory>,
    ) -> Result<(), MatchError> {
        self.check_seat(seat)?;
        let player = factory.create().map_err(|e| {
            MatchError::illegal_state(format!("{} could not create a player: {e}", factory.name()))
        })?;
        self.seats.insert(
            seat,
            PlayerBinding {
                player,
                factory: Some(factory),
            },
        );
        Ok(())
    }

    #[instrument(skip(self))]
    fn set_player_parameter(&mut self, seat: Seat, name: &str, value: &str) -> Result<(), MatchError> {
        self.check_seat(seat)?;
        let binding = self
            .seats
            .get_mut(&seat)
            .ok_or_else(|| MatchError::illegal_state(format!("seat {seat} has no player")))?;
        let factory = binding.factory.as_mut().ok_or_else(|| {
            MatchError::illegal_state(format!("seat {seat} was not bound through a factory"))
        })?;
        check_parameter(&factory.parameters(), name, value)?;
        factory.set_parameter(name, value).map_err(|e| {
            MatchError::illegal_state(format!("{} rejected {name}={value}: {e}", factory.name()))
        })?;
        binding.player = factory.create().map_err(|e| {
            MatchError::illegal_state(format!("{} could not create a player: {e}", factory.name()))
        })?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), MatchError> {
        self.rules = None;
        self.seats.clear();
        info!("Rules and seats cleared");
        Ok(())
    }

    /// Checks that a match can start and creates its rule object.
    pub(super) fn prepare(&self) -> Result<Box<dyn RuleSet>, MatchError> {
        let rules = self
            .rules
            .as_ref()
            .ok_or_else(|| MatchError::illegal_state("no rules set"))?;
        if let Some(seat) = (1..=rules.seats()).find(|seat| !self.seats.contains_key(seat)) {
            return Err(MatchError::illegal_state(format!("seat {seat} has no player")));
        }
        rules
            .create()
            .map_err(|e| MatchError::illegal_state(format!("{} failed to start: {e}", rules.name())))
    }

    fn configure(&mut self, command: Command) {
        let (result, ack) = match command {
            Command::SetRules { factory, ack } => (self.set_rules(factory), ack),
            Command::SetRuleParameter { name, value, ack } => {
                (self.set_rule_parameter(&name, &value), ack)
            }
            Command::SetPlayer { seat, player, ack } => (self.set_player(seat, player), ack),
            Command::SetPlayerFactory { seat, factory, ack } => {
                (self.set_player_factory(seat, factory), ack)
            }
            Command::SetPlayerParameter {
                seat,
                name,
                value,
                ack,
            } => (self.set_player_parameter(seat, &name, &value), ack),
            Command::Reset { ack } => (self.reset(), ack),
            Command::Play(request) => {
                warn!("Play routed to configuration");
                (
                    Err(MatchError::illegal_state("play is not a configuration command")),
                    request.ack,
                )
            }
        };
        if let Err(error) = &result {
            debug!(%error, "Configuration rejected");
        }
        let _ = ack.send(result);
    }
}

/// Returns the slot to Idle and releases `stop()` waiters when a match
/// handler ends, including by panic.
struct ExitGuard {
    control: Arc<MatchControl>,
    state: Arc<watch::Sender<MatchState>>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.state.send_replace(MatchState::Idle);
        self.control.mark_exited();
    }
}

/// Handle to the running worker task.
pub(super) struct Worker {
    commands: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<Confined>,
}

impl Worker {
    pub(super) fn spawn(confined: Confined, state: Arc<watch::Sender<MatchState>>) -> Self {
        let (commands, queue) = mpsc::unbounded_channel();
        let handle = tokio::spawn(serve(confined, queue, state));
        debug!("Confinement worker spawned");
        Self { commands, handle }
    }

    pub(super) fn sender(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }

    pub(super) fn accepts_commands(&self) -> bool {
        !self.commands.is_closed() && !self.handle.is_finished()
    }

    /// Waits for the task to hand its state back.
    pub(super) async fn retire(self) -> Result<Confined, MatchError> {
        drop(self.commands);
        self.handle.await.map_err(|e| {
            MatchError::illegal_state(format!("confinement worker failed: {e}"))
        })
    }
}

async fn serve(
    mut confined: Confined,
    mut queue: mpsc::UnboundedReceiver<Command>,
    state: Arc<watch::Sender<MatchState>>,
) -> Confined {
    while let Some(command) = queue.recv().await {
        let request = match command {
            Command::Play(request) => request,
            other => {
                debug!(command = %other, "Configuring");
                confined.configure(other);
                continue;
            }
        };
        let guard = ExitGuard {
            control: request.control.clone(),
            state: state.clone(),
        };
        let outcome = turn::run(&mut confined, request, &state).await;
        if outcome.retires_worker() {
            queue.close();
            while let Ok(command) = queue.try_recv() {
                debug!(command = %command, "Discarding queued command");
            }
            drop(guard);
            info!(?outcome, "Confinement worker retired");
            return confined;
        }
        drop(guard);
    }
    debug!("Confinement worker idle with no handles left");
    confined
}
