//! Shared helpers for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use turn_arbiter::{
    Executors, MatchEvent, Move, Orchestrator, Player, PlayerFactory, RuleFactory, RuleSet, Seat,
};

/// What a scripted player does when asked for a move.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Plays the first legal move straight away.
    FirstLegal,
    /// Thinks for the duration, then plays the first legal move.
    Slow(Duration),
    /// Plays a pass, which tic-tac-toe never allows.
    Illegal,
    /// Returns an error.
    Fail,
}

/// Player driven by a [`Script`].
pub struct ScriptedPlayer {
    name: String,
    script: Script,
    setup_delay: Duration,
    notify_delay: Duration,
    fail_notifications: bool,
    game: Option<Box<dyn RuleSet>>,
    offered_executors: Arc<AtomicBool>,
}

impl ScriptedPlayer {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            setup_delay: Duration::ZERO,
            notify_delay: Duration::ZERO,
            fail_notifications: false,
            game: None,
            offered_executors: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes `set_game` take `delay`.
    pub fn with_setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = delay;
        self
    }

    /// Makes every `moved` take `delay`.
    pub fn with_notify_delay(mut self, delay: Duration) -> Self {
        self.notify_delay = delay;
        self
    }

    /// Makes every `moved` return an error.
    pub fn failing_notifications(mut self) -> Self {
        self.fail_notifications = true;
        self
    }

    /// Flag raised once the orchestrator offers executors.
    pub fn executors_flag(&self) -> Arc<AtomicBool> {
        self.offered_executors.clone()
    }

    fn first_legal(&self) -> anyhow::Result<Move> {
        let game = self
            .game
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no game"))?;
        Ok(game
            .legal_moves()
            .into_iter()
            .next()
            .unwrap_or(Move::Resign))
    }
}

#[async_trait::async_trait]
impl Player for ScriptedPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_game(&mut self, game: Box<dyn RuleSet>) -> anyhow::Result<()> {
        if !self.setup_delay.is_zero() {
            tokio::time::sleep(self.setup_delay).await;
        }
        self.game = Some(game);
        Ok(())
    }

    async fn get_move(&mut self) -> anyhow::Result<Move> {
        match self.script {
            Script::FirstLegal => self.first_legal(),
            Script::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.first_legal()
            }
            Script::Illegal => Ok(Move::Pass),
            Script::Fail => anyhow::bail!("scripted failure"),
        }
    }

    async fn moved(&mut self, _seat: Seat, mv: &Move) -> anyhow::Result<()> {
        if !self.notify_delay.is_zero() {
            tokio::time::sleep(self.notify_delay).await;
        }
        if self.fail_notifications {
            anyhow::bail!("scripted notification failure");
        }
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no game"))?;
        if !game.apply_move(mv) {
            anyhow::bail!("copy rejected {mv}");
        }
        Ok(())
    }

    fn provide_executors(&mut self, _executors: &Executors) {
        self.offered_executors.store(true, Ordering::SeqCst);
    }
}

/// Rule factory whose games can never be created.
pub struct BrokenRules;

impl RuleFactory for BrokenRules {
    fn name(&self) -> &str {
        "broken"
    }

    fn seats(&self) -> usize {
        2
    }

    fn create(&self) -> anyhow::Result<Box<dyn RuleSet>> {
        anyhow::bail!("out of boards")
    }
}

/// Player factory that never produces a player.
pub struct BrokenPlayers;

impl PlayerFactory for BrokenPlayers {
    fn name(&self) -> &str {
        "broken"
    }

    fn create(&self) -> anyhow::Result<Box<dyn Player>> {
        anyhow::bail!("no players today")
    }
}

/// Orchestrator reporting into a channel.
pub fn orchestrator() -> (Orchestrator, mpsc::UnboundedReceiver<MatchEvent>) {
    let (events, received) = mpsc::unbounded_channel();
    (Orchestrator::new(events), received)
}

/// Receives events up to and including the first terminal one.
pub async fn until_terminal(received: &mut mpsc::UnboundedReceiver<MatchEvent>) -> Vec<MatchEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("match ended in time")
            .expect("orchestrator alive");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

/// Everything already queued.
pub fn drain(received: &mut mpsc::UnboundedReceiver<MatchEvent>) -> Vec<MatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = received.try_recv() {
        events.push(event);
    }
    events
}

pub fn moves(events: &[MatchEvent]) -> Vec<(Seat, Move)> {
    events
        .iter()
        .filter_map(|event| match event {
            MatchEvent::Moved { seat, mv } => Some((*seat, mv.clone())),
            _ => None,
        })
        .collect()
}

pub fn limit_breaks(events: &[MatchEvent]) -> Vec<(Seat, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            MatchEvent::LimitBreak { seat, message } => Some((*seat, message.clone())),
            _ => None,
        })
        .collect()
}
