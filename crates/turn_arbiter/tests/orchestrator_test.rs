//! Integration tests for match orchestration.

mod common;

use common::{
    BrokenPlayers, BrokenRules, Script, ScriptedPlayer, drain, limit_breaks, moves, orchestrator,
    until_terminal,
};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use turn_arbiter::{
    Action, ArbiterConfig, FirstMoveFactory, GameResult, HumanPlayer, HumanTurn, Mark, MatchConfig, MatchEvent,
    MatchState, Move, Orchestrator, Position, TicTacToeFactory,
};

async fn first_move_match(orchestrator: &Orchestrator) {
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player_factory(1, FirstMoveFactory::new("first"))
        .await
        .unwrap();
    orchestrator
        .set_player_factory(2, FirstMoveFactory::new("second"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_first_move_players_play_to_a_win() {
    let (orchestrator, mut received) = orchestrator();
    first_move_match(&orchestrator).await;

    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    orchestrator.wait().await;

    assert!(matches!(events[0], MatchEvent::GameSet(_)));
    assert_eq!(
        events[1],
        MatchEvent::Players(vec![(1, "first".to_string()), (2, "second".to_string())])
    );
    let played = moves(&events);
    assert_eq!(played.len(), 7);
    assert_eq!(played[0].0, 1);
    assert_eq!(played[1].0, 2);
    assert_eq!(
        played[6].1,
        Move::Actions(vec![Action::add([Position::new(0, 2)], Mark::X.piece())])
    );
    assert!(limit_breaks(&events).is_empty());
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Winner(1))))
    );
    assert_eq!(orchestrator.state(), MatchState::Idle);
}

#[tokio::test]
async fn test_duplicate_names_are_told_apart() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    for seat in [1, 2] {
        orchestrator
            .set_player(seat, ScriptedPlayer::new("bot", Script::FirstLegal))
            .await
            .unwrap();
    }
    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    assert_eq!(
        events[1],
        MatchEvent::Players(vec![(1, "bot (1)".to_string()), (2, "bot (2)".to_string())])
    );
}

#[tokio::test]
async fn test_configuration_errors() {
    let (orchestrator, _received) = orchestrator();

    let error = orchestrator
        .set_player(1, ScriptedPlayer::new("early", Script::FirstLegal))
        .await
        .unwrap_err();
    assert!(error.is_illegal_state());

    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    for seat in [0, 3] {
        let error = orchestrator
            .set_player(seat, ScriptedPlayer::new("lost", Script::FirstLegal))
            .await
            .unwrap_err();
        assert!(error.is_illegal_argument());
    }

    assert!(
        orchestrator
            .set_rule_parameter("board_size", "4")
            .await
            .unwrap_err()
            .is_illegal_argument()
    );
    assert!(
        orchestrator
            .set_rule_parameter("time_limit_ms", "7")
            .await
            .unwrap_err()
            .is_illegal_argument()
    );
    orchestrator
        .set_rule_parameter("time_limit_ms", "250")
        .await
        .unwrap();

    orchestrator
        .set_player(1, ScriptedPlayer::new("plain", Script::FirstLegal))
        .await
        .unwrap();
    assert!(
        orchestrator
            .set_player_parameter(1, "delay_ms", "10")
            .await
            .unwrap_err()
            .is_illegal_state()
    );

    let error = orchestrator.play(MatchConfig::default()).await.unwrap_err();
    assert!(error.is_illegal_state());
    assert_eq!(orchestrator.state(), MatchState::Idle);

    orchestrator
        .set_player(2, ScriptedPlayer::new("plain", Script::FirstLegal))
        .await
        .unwrap();
    let error = orchestrator
        .play(MatchConfig::default().with_aux_pool_size(0))
        .await
        .unwrap_err();
    assert!(error.is_illegal_argument());
    assert_eq!(orchestrator.state(), MatchState::Idle);
}

#[tokio::test]
async fn test_player_parameters() {
    let (orchestrator, _received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player_factory(1, FirstMoveFactory::new("tuned"))
        .await
        .unwrap();

    orchestrator
        .set_player_parameter(1, "delay_ms", "10")
        .await
        .unwrap();
    assert!(
        orchestrator
            .set_player_parameter(1, "delay_ms", "7")
            .await
            .unwrap_err()
            .is_illegal_argument()
    );
    assert!(
        orchestrator
            .set_player_parameter(1, "depth", "3")
            .await
            .unwrap_err()
            .is_illegal_argument()
    );
    assert!(
        orchestrator
            .set_player_parameter(2, "delay_ms", "10")
            .await
            .unwrap_err()
            .is_illegal_state()
    );
}

#[tokio::test]
async fn test_failing_factories() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(BrokenRules).await.unwrap();
    assert!(
        orchestrator
            .set_player_factory(1, BrokenPlayers)
            .await
            .unwrap_err()
            .is_illegal_state()
    );
    for seat in [1, 2] {
        orchestrator
            .set_player(seat, ScriptedPlayer::new("ready", Script::FirstLegal))
            .await
            .unwrap();
    }

    let error = orchestrator.play(MatchConfig::default()).await.unwrap_err();
    assert!(error.is_illegal_state());
    assert_eq!(orchestrator.state(), MatchState::Idle);
    assert!(drain(&mut received).is_empty());
}

#[tokio::test]
async fn test_reset_forgets_everything() {
    let (orchestrator, _received) = orchestrator();
    first_move_match(&orchestrator).await;
    orchestrator.reset().await.unwrap();
    assert!(
        orchestrator
            .play(MatchConfig::default())
            .await
            .unwrap_err()
            .is_illegal_state()
    );
}

#[tokio::test]
async fn test_configure_while_running_is_rejected() {
    let (orchestrator, _received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, ScriptedPlayer::new("thinker", Script::Slow(Duration::from_secs(30))))
        .await
        .unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("waiter", Script::FirstLegal))
        .await
        .unwrap();
    orchestrator.play(MatchConfig::default()).await.unwrap();

    assert!(
        orchestrator
            .set_rules(TicTacToeFactory::new())
            .await
            .unwrap_err()
            .is_illegal_state()
    );
    assert!(
        orchestrator
            .play(MatchConfig::default())
            .await
            .unwrap_err()
            .is_illegal_state()
    );
    assert!(orchestrator.stop().await);
}

#[tokio::test]
async fn test_stop_human_mid_selection() {
    let (orchestrator, mut received) = orchestrator();
    let (surface, mut turns) = mpsc::unbounded_channel::<HumanTurn>();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, HumanPlayer::new("human", surface, orchestrator.subscribe()))
        .await
        .unwrap();
    orchestrator
        .set_player_factory(2, FirstMoveFactory::new("machine"))
        .await
        .unwrap();
    orchestrator.play(MatchConfig::default()).await.unwrap();

    let mut turn = turns.recv().await.expect("human asked to move");
    assert_eq!(turn.seat, 1);
    assert_eq!(*turn.match_state.borrow(), MatchState::Running);
    assert_eq!(turn.tree.select([Position::new(1, 1)]).unwrap().len(), 1);

    assert!(orchestrator.stop().await);
    assert_eq!(orchestrator.state(), MatchState::Idle);

    let events = drain(&mut received);
    let interrupted = events
        .iter()
        .filter(|event| matches!(event, MatchEvent::Interrupted(_)))
        .count();
    assert_eq!(interrupted, 1);
    assert!(moves(&events).is_empty());
    assert!(limit_breaks(&events).is_empty());
    assert!(matches!(events.last(), Some(MatchEvent::Interrupted(_))));

    assert!(turn.tree.do_selection(Some(&Mark::X.piece())).unwrap_err().is_illegal_state());
    assert!(turn.tree.resign().unwrap_err().is_illegal_state());
    assert!(!orchestrator.stop().await);
}

#[tokio::test]
async fn test_human_moves_then_resigns() {
    let (orchestrator, mut received) = orchestrator();
    let (surface, mut turns) = mpsc::unbounded_channel::<HumanTurn>();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, HumanPlayer::new("human", surface, orchestrator.subscribe()))
        .await
        .unwrap();
    orchestrator
        .set_player_factory(2, FirstMoveFactory::new("machine"))
        .await
        .unwrap();
    orchestrator.play(MatchConfig::default()).await.unwrap();

    let mut turn = turns.recv().await.expect("first turn");
    turn.tree.select([Position::new(1, 1)]).unwrap();
    turn.tree.do_selection(Some(&Mark::X.piece())).unwrap();
    turn.tree.make_move().unwrap();

    let mut turn = turns.recv().await.expect("second turn");
    assert!(turn.tree.board().unwrap().get(Position::new(0, 0)).is_some());
    turn.tree.resign().unwrap();

    let events = until_terminal(&mut received).await;
    assert_eq!(
        moves(&events),
        vec![
            (
                1,
                Move::Actions(vec![Action::add([Position::new(1, 1)], Mark::X.piece())])
            ),
            (
                2,
                Move::Actions(vec![Action::add([Position::new(0, 0)], Mark::O.piece())])
            ),
            (1, Move::Resign),
        ]
    );
    assert!(limit_breaks(&events).is_empty());
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Resignation(1))))
    );
}

#[tokio::test]
async fn test_slow_player_is_forced_to_resign() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, ScriptedPlayer::new("sleepy", Script::Slow(Duration::from_secs(30))))
        .await
        .unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("quick", Script::FirstLegal))
        .await
        .unwrap();

    let started = Instant::now();
    orchestrator
        .play(MatchConfig::default().with_timeout(Duration::from_millis(50)))
        .await
        .unwrap();
    let events = until_terminal(&mut received).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let breaks = limit_breaks(&events);
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].0, 1);
    assert!(breaks[0].1.contains("get_move"));
    assert_eq!(moves(&events), vec![(1, Move::Resign)]);
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Resignation(1))))
    );
}

#[tokio::test]
async fn test_game_time_limit_overrides_call_timeout() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_rule_parameter("time_limit_ms", "1000")
        .await
        .unwrap();
    for seat in [1, 2] {
        orchestrator
            .set_player(seat, ScriptedPlayer::new("steady", Script::Slow(Duration::from_millis(60))))
            .await
            .unwrap();
    }

    orchestrator
        .play(MatchConfig::default().with_timeout(Duration::from_millis(20)))
        .await
        .unwrap();
    let events = until_terminal(&mut received).await;
    assert!(limit_breaks(&events).is_empty());
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Winner(1))))
    );
}

#[tokio::test]
async fn test_illegal_move_is_forced_resignation() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, ScriptedPlayer::new("cheat", Script::Illegal))
        .await
        .unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("fair", Script::FirstLegal))
        .await
        .unwrap();

    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    let breaks = limit_breaks(&events);
    assert_eq!(breaks.len(), 1);
    assert!(breaks[0].1.contains("illegal move"));
    assert_eq!(moves(&events), vec![(1, Move::Resign)]);
}

#[tokio::test]
async fn test_player_error_is_forced_resignation() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, ScriptedPlayer::new("fair", Script::FirstLegal))
        .await
        .unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("broken", Script::Fail))
        .await
        .unwrap();

    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    assert_eq!(limit_breaks(&events).len(), 1);
    assert_eq!(limit_breaks(&events)[0].0, 2);
    assert_eq!(moves(&events).last(), Some(&(2, Move::Resign)));
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Resignation(2))))
    );
}

#[tokio::test]
async fn test_setup_violation_aborts_and_worker_recovers() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(
            1,
            ScriptedPlayer::new("late", Script::FirstLegal).with_setup_delay(Duration::from_secs(30)),
        )
        .await
        .unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("ready", Script::FirstLegal))
        .await
        .unwrap();

    orchestrator
        .play(MatchConfig::default().with_timeout(Duration::from_millis(30)))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait())
        .await
        .expect("aborted match released the slot");

    let events = drain(&mut received);
    let breaks = limit_breaks(&events);
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].0, 1);
    assert!(breaks[0].1.contains("set_game"));
    assert_eq!(events.last(), Some(&MatchEvent::Aborted(breaks[0].1.clone())));
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, MatchEvent::Interrupted(_)))
    );

    orchestrator
        .set_player(1, ScriptedPlayer::new("punctual", Script::FirstLegal))
        .await
        .unwrap();
    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Winner(1))))
    );
}

#[tokio::test]
async fn test_zero_budget_ends_with_an_abort_event() {
    let config = ArbiterConfig::from_toml("timeout_ms = 0").unwrap();
    let (events, mut received) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::from_config(events, &config);
    first_move_match(&orchestrator).await;

    orchestrator.play(config.match_config()).await.unwrap();
    let events = until_terminal(&mut received).await;
    let breaks = limit_breaks(&events);
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].0, 1);
    assert!(breaks[0].1.contains("set_game"));
    assert!(matches!(events.last(), Some(MatchEvent::Aborted(_))));
    assert!(moves(&events).is_empty());

    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait())
        .await
        .expect("aborted match released the slot");
    assert_eq!(orchestrator.state(), MatchState::Idle);
}

#[tokio::test]
async fn test_failing_notification_aborts_and_worker_recovers() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(1, ScriptedPlayer::new("steady", Script::FirstLegal))
        .await
        .unwrap();
    orchestrator
        .set_player(
            2,
            ScriptedPlayer::new("deaf", Script::FirstLegal).failing_notifications(),
        )
        .await
        .unwrap();

    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    let breaks = limit_breaks(&events);
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].0, 2);
    assert!(breaks[0].1.contains("moved failed"));
    assert_eq!(events.last(), Some(&MatchEvent::Aborted(breaks[0].1.clone())));
    assert!(moves(&events).is_empty());
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, MatchEvent::Interrupted(_) | MatchEvent::Finished(_)))
    );

    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait())
        .await
        .expect("aborted match released the slot");
    assert!(!orchestrator.stop().await);

    orchestrator
        .set_player(2, ScriptedPlayer::new("listening", Script::FirstLegal))
        .await
        .unwrap();
    orchestrator.play(MatchConfig::default()).await.unwrap();
    let events = until_terminal(&mut received).await;
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Winner(1))))
    );
}

#[tokio::test]
async fn test_slow_notification_aborts_the_match() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    orchestrator
        .set_player(
            1,
            ScriptedPlayer::new("dawdler", Script::FirstLegal)
                .with_notify_delay(Duration::from_secs(30)),
        )
        .await
        .unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("ready", Script::FirstLegal))
        .await
        .unwrap();

    orchestrator
        .play(MatchConfig::default().with_timeout(Duration::from_millis(30)))
        .await
        .unwrap();
    let events = until_terminal(&mut received).await;
    let breaks = limit_breaks(&events);
    assert_eq!(breaks, vec![(1, "moved exceeded 30 ms".to_string())]);
    assert!(matches!(events.last(), Some(MatchEvent::Aborted(_))));

    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait())
        .await
        .expect("aborted match released the slot");
    assert_eq!(orchestrator.state(), MatchState::Idle);
}

#[tokio::test]
async fn test_consecutive_matches_are_independent() {
    let (orchestrator, mut received) = orchestrator();
    first_move_match(&orchestrator).await;

    for _ in 0..2 {
        orchestrator.play(MatchConfig::default()).await.unwrap();
        let events = until_terminal(&mut received).await;
        orchestrator.wait().await;
        assert_eq!(moves(&events).len(), 7);
        assert!(limit_breaks(&events).is_empty());
        assert_eq!(
            events.last(),
            Some(&MatchEvent::Finished(Some(GameResult::Winner(1))))
        );
        assert!(!orchestrator.stop().await);
    }
}

#[tokio::test]
async fn test_pause_between_moves() {
    let (orchestrator, mut received) = orchestrator();
    first_move_match(&orchestrator).await;

    let started = Instant::now();
    orchestrator
        .play(MatchConfig::default().with_min_time_between_moves(Duration::from_millis(30)))
        .await
        .unwrap();
    until_terminal(&mut received).await;
    assert!(started.elapsed() >= Duration::from_millis(180));
}

#[tokio::test]
async fn test_stop_cuts_the_pause_short() {
    let (orchestrator, mut received) = orchestrator();
    first_move_match(&orchestrator).await;

    orchestrator
        .play(MatchConfig::default().with_min_time_between_moves(Duration::from_secs(30)))
        .await
        .unwrap();
    loop {
        let event = received.recv().await.expect("events");
        if matches!(event, MatchEvent::Moved { .. }) {
            break;
        }
    }

    let started = Instant::now();
    assert!(orchestrator.stop().await);
    assert!(started.elapsed() < Duration::from_secs(5));
    let events = drain(&mut received);
    assert!(moves(&events).is_empty());
    assert!(matches!(events.as_slice(), [MatchEvent::Interrupted(_)]));
}

#[tokio::test]
async fn test_stop_when_idle() {
    let (orchestrator, _received) = orchestrator();
    assert!(!orchestrator.stop().await);
    first_move_match(&orchestrator).await;
    assert!(!orchestrator.stop().await);
}

#[tokio::test]
async fn test_executors_are_offered_when_bounded() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    let watched = ScriptedPlayer::new("watched", Script::FirstLegal);
    let offered = watched.executors_flag();
    orchestrator.set_player(1, watched).await.unwrap();
    orchestrator
        .set_player_factory(2, FirstMoveFactory::new("pooled"))
        .await
        .unwrap();

    orchestrator
        .play(MatchConfig::default().with_aux_pool_size(1))
        .await
        .unwrap();
    let events = until_terminal(&mut received).await;
    assert!(offered.load(Ordering::SeqCst));
    assert!(matches!(events.last(), Some(MatchEvent::Finished(Some(_)))));
}

#[tokio::test]
async fn test_executors_withheld_without_bounds() {
    let (orchestrator, mut received) = orchestrator();
    orchestrator.set_rules(TicTacToeFactory::new()).await.unwrap();
    let watched = ScriptedPlayer::new("watched", Script::FirstLegal);
    let offered = watched.executors_flag();
    orchestrator.set_player(1, watched).await.unwrap();
    orchestrator
        .set_player(2, ScriptedPlayer::new("other", Script::FirstLegal))
        .await
        .unwrap();

    orchestrator.play(MatchConfig::default()).await.unwrap();
    until_terminal(&mut received).await;
    assert!(!offered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_first_move_players_use_extra_and_background_pools() {
    let (orchestrator, mut received) = orchestrator();
    first_move_match(&orchestrator).await;

    let config = MatchConfig::default()
        .with_max_extra_threads(1)
        .with_background_pool_size(1);
    orchestrator.play(config).await.unwrap();
    let events = until_terminal(&mut received).await;
    assert_eq!(moves(&events).len(), 7);
    assert!(limit_breaks(&events).is_empty());
    assert_eq!(
        events.last(),
        Some(&MatchEvent::Finished(Some(GameResult::Winner(1))))
    );
}
