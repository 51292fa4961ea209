//! Match orchestration between players.
//!
//! Every rule, player and observer object lives inside one confinement
//! worker task. The [`Orchestrator`] handle only submits commands to that
//! worker and waits for their acknowledgement, so those objects never see
//! concurrent or re-entrant calls.

mod turn;
mod worker;

use crate::board::Seat;
use crate::config::{ArbiterConfig, MatchConfig};
use crate::control::MatchControl;
use crate::error::MatchError;
use crate::observer::Observer;
use crate::players::{Player, PlayerFactory};
use crate::rules::RuleFactory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{debug, info, instrument, warn};
use worker::{Ack, Command, Confined, PlayRequest, Worker};

/// Lifecycle of the orchestrator's single match slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum MatchState {
    /// No match; configuration is allowed.
    #[default]
    Idle,
    /// A match was requested and is being set up.
    Configuring,
    /// Players are moving.
    Running,
    /// The match ran to its end.
    Finished,
    /// The match was stopped or aborted.
    Interrupted,
}

impl MatchState {
    fn is_live(self) -> bool {
        matches!(self, MatchState::Configuring | MatchState::Running)
    }

    fn is_ending(self) -> bool {
        matches!(self, MatchState::Finished | MatchState::Interrupted)
    }
}

enum WorkerSlot {
    /// No task running; the state waits for the next command.
    Parked(Confined),
    Active(Worker),
    /// The worker panicked and took the confined state with it.
    Lost,
}

struct Slot {
    worker: WorkerSlot,
    control: Option<Arc<MatchControl>>,
    block_timeout: Option<Duration>,
}

impl Slot {
    /// Sender of a worker that still accepts commands, spawning a fresh one
    /// when the previous worker retired.
    async fn commands(
        &mut self,
        state: &Arc<watch::Sender<MatchState>>,
    ) -> Result<tokio::sync::mpsc::UnboundedSender<Command>, MatchError> {
        if let WorkerSlot::Active(worker) = &self.worker {
            if worker.accepts_commands() {
                return Ok(worker.sender());
            }
        }
        let confined = match std::mem::replace(&mut self.worker, WorkerSlot::Lost) {
            WorkerSlot::Parked(confined) => confined,
            WorkerSlot::Active(worker) => worker.retire().await?,
            WorkerSlot::Lost => {
                return Err(MatchError::illegal_state("confinement worker was lost"));
            }
        };
        let worker = Worker::spawn(confined, state.clone());
        let sender = worker.sender();
        self.worker = WorkerSlot::Active(worker);
        Ok(sender)
    }

    /// Joins a worker that stopped accepting commands.
    async fn retire_closed_worker(&mut self) {
        let closed = matches!(&self.worker, WorkerSlot::Active(worker) if !worker.accepts_commands());
        if !closed {
            return;
        }
        if let WorkerSlot::Active(worker) = std::mem::replace(&mut self.worker, WorkerSlot::Lost) {
            match worker.retire().await {
                Ok(confined) => self.worker = WorkerSlot::Parked(confined),
                Err(error) => warn!(%error, "Could not recover confined state"),
            }
        }
    }
}

struct Inner {
    state: Arc<watch::Sender<MatchState>>,
    slot: Mutex<Slot>,
}

/// Handle to one match slot.
///
/// Cloning the handle shares the slot. Configuration calls are only accepted
/// while no match is configuring or running.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an idle orchestrator reporting to `observer`.
    pub fn new(observer: impl Observer + 'static) -> Self {
        Self::with_block_timeout(Box::new(observer), None)
    }

    /// Creates an orchestrator with the block timeout from `config`.
    pub fn from_config(observer: impl Observer + 'static, config: &ArbiterConfig) -> Self {
        Self::with_block_timeout(Box::new(observer), config.block_timeout())
    }

    fn with_block_timeout(observer: Box<dyn Observer>, block_timeout: Option<Duration>) -> Self {
        let (state, _) = watch::channel(MatchState::Idle);
        Self {
            inner: Arc::new(Inner {
                state: Arc::new(state),
                slot: Mutex::new(Slot {
                    worker: WorkerSlot::Parked(Confined::new(observer)),
                    control: None,
                    block_timeout,
                }),
            }),
        }
    }

    /// Sets the limit applied to every call into a player, on top of each
    /// match's own timeout. Takes effect at the next `play`.
    pub async fn set_block_timeout(&self, limit: Option<Duration>) {
        self.inner.slot.lock().await.block_timeout = limit;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MatchState {
        *self.inner.state.borrow()
    }

    /// Watches lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<MatchState> {
        self.inner.state.subscribe()
    }

    /// Waits until the previous match finished tearing down.
    async fn settled(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|state| !state.is_ending()).await;
    }

    async fn submit(&self, command: impl FnOnce(Ack) -> Command) -> Result<(), MatchError> {
        self.settled().await;
        let (ack, acked) = oneshot::channel();
        {
            let mut slot = self.inner.slot.lock().await;
            let state = self.state();
            if state.is_live() {
                return Err(MatchError::illegal_state(format!(
                    "cannot configure while the match is {state}"
                )));
            }
            let commands = slot.commands(&self.inner.state).await?;
            commands
                .send(command(ack))
                .map_err(|_| MatchError::illegal_state("confinement worker stopped"))?;
        }
        acked
            .await
            .map_err(|_| MatchError::illegal_state("command was discarded by a retiring worker"))?
    }

    /// Installs the game. Bindings for seats the new game lacks are dropped.
    #[instrument(skip(self, factory), fields(game = %factory.name()))]
    pub async fn set_rules(&self, factory: impl RuleFactory + 'static) -> Result<(), MatchError> {
        let factory: Box<dyn RuleFactory> = Box::new(factory);
        self.submit(|ack| Command::SetRules { factory, ack }).await
    }

    /// Changes a game parameter.
    #[instrument(skip(self))]
    pub async fn set_rule_parameter(&self, name: &str, value: &str) -> Result<(), MatchError> {
        let (name, value) = (name.to_string(), value.to_string());
        self.submit(|ack| Command::SetRuleParameter { name, value, ack })
            .await
    }

    /// Binds `player` to `seat`, replacing any earlier binding.
    #[instrument(skip(self, player), fields(player = %player.name()))]
    pub async fn set_player(
        &self,
        seat: Seat,
        player: impl Player + 'static,
    ) -> Result<(), MatchError> {
        let player: Box<dyn Player> = Box::new(player);
        self.submit(|ack| Command::SetPlayer { seat, player, ack })
            .await
    }

    /// Binds a player created by `factory` to `seat` and keeps the factory
    /// for later parameter changes.
    #[instrument(skip(self, factory), fields(factory = %factory.name()))]
    pub async fn set_player_factory(
        &self,
        seat: Seat,
        factory: impl PlayerFactory + 'static,
    ) -> Result<(), MatchError> {
        let factory: Box<dyn PlayerFactory> = Box::new(factory);
        self.submit(|ack| Command::SetPlayerFactory { seat, factory, ack })
            .await
    }

    /// Changes a parameter of the factory bound to `seat` and recreates the
    /// seat's player.
    #[instrument(skip(self))]
    pub async fn set_player_parameter(
        &self,
        seat: Seat,
        name: &str,
        value: &str,
    ) -> Result<(), MatchError> {
        let (name, value) = (name.to_string(), value.to_string());
        self.submit(|ack| Command::SetPlayerParameter {
            seat,
            name,
            value,
            ack,
        })
        .await
    }

    /// Forgets the game and every seat binding.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<(), MatchError> {
        self.submit(|ack| Command::Reset { ack }).await
    }

    /// Starts a match.
    ///
    /// Returns once the worker accepted the match; the turn loop keeps
    /// running in the background. Use [`Orchestrator::wait`] to await its
    /// end and [`Orchestrator::stop`] to cut it short.
    #[instrument(skip(self))]
    pub async fn play(&self, config: MatchConfig) -> Result<(), MatchError> {
        for (name, size) in [
            ("max_extra_threads", config.max_extra_threads()),
            ("aux_pool_size", config.aux_pool_size()),
            ("background_pool_size", config.background_pool_size()),
        ] {
            if *size == Some(0) {
                return Err(MatchError::illegal_argument(format!(
                    "{name} must be at least 1"
                )));
            }
        }

        self.settled().await;
        let (ack, acked) = oneshot::channel();
        {
            let mut slot = self.inner.slot.lock().await;
            let state = self.state();
            if state != MatchState::Idle {
                return Err(MatchError::illegal_state(format!(
                    "cannot start a match while {state}"
                )));
            }
            let commands = slot.commands(&self.inner.state).await?;
            let control = Arc::new(MatchControl::new());
            let request = PlayRequest::new(config, slot.block_timeout, control.clone(), ack);
            self.inner.state.send_replace(MatchState::Configuring);
            if commands.send(Command::Play(request)).is_err() {
                self.inner.state.send_replace(MatchState::Idle);
                return Err(MatchError::illegal_state("confinement worker stopped"));
            }
            slot.control = Some(control);
        }
        info!("Match requested");
        acked
            .await
            .map_err(|_| MatchError::illegal_state("match was dropped before it started"))?
    }

    /// Resolves once no match is configuring or running.
    pub async fn wait(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|state| *state == MatchState::Idle).await;
    }

    /// Stops the current match.
    ///
    /// Returns after the turn loop exited and the worker was replaced.
    /// False when no match was running or it had already ended.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> bool {
        let control = self.inner.slot.lock().await.control.clone();
        let Some(control) = control else {
            debug!("No match to stop");
            return false;
        };
        if !control.request_stop("stopped by request") {
            debug!("Match already ended");
            return false;
        }
        control.exited().await;
        let mut slot = self.inner.slot.lock().await;
        slot.retire_closed_worker().await;
        info!("Match stopped");
        true
    }
}
