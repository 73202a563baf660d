//! 完整对局流程：用真实引擎驱动 MatchCore

use std::sync::{Arc, Mutex};
use std::time::Duration;

use match_client::{
    ChannelEvent, ChessEngine, MatchCore, MatchEvent, MatchOptions, PositionEngine, Premove,
    SessionState,
};
use protocol::{Action, ClientMessage, GameState, Side, UciMove, UserInfo};
use serde_json::{json, Value};
use tokio::time::Instant;

fn user(id: u64) -> UserInfo {
    serde_json::from_value(json!({ "id": id, "guest": false })).unwrap()
}

fn snapshot(turn: u8, moves: &[&str], extra: Value) -> GameState {
    let mut value = json!({
        "id": 501,
        "players": [{ "id": 1, "name": "alice" }, { "id": 2, "name": "bob" }],
        "turn": turn,
        "moves": moves,
        "result": "*",
        "clocks": [
            { "time": 180000, "active": !moves.is_empty() },
            { "time": 180000, "active": false },
        ],
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (key, v) in extra {
            base.insert(key.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}

fn mv(s: &str) -> UciMove {
    s.parse().unwrap()
}

fn record(core: &mut MatchCore<ChessEngine>) -> Arc<Mutex<Vec<MatchEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    core.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

fn player(user_id: u64) -> MatchCore<ChessEngine> {
    let mut core = MatchCore::new(
        ChessEngine::new(),
        MatchOptions {
            auth_token: Some("token".into()),
            ..MatchOptions::default()
        },
    );
    let now = Instant::now();
    core.on_channel_event(ChannelEvent::Opened, now);
    core.on_channel_event(ChannelEvent::Authenticated(user(user_id)), now);
    core
}

fn sent_actions(core: &mut MatchCore<ChessEngine>) -> Vec<Action> {
    core.take_outbox()
        .messages
        .iter()
        .map(|m| m.action)
        .collect()
}

#[test]
fn auth_then_seek() {
    let mut core = MatchCore::new(
        ChessEngine::new(),
        MatchOptions {
            auth_token: Some("token".into()),
            ..MatchOptions::default()
        },
    );
    let events = record(&mut core);
    let now = Instant::now();

    core.on_channel_event(ChannelEvent::Opened, now);
    let outbox = core.take_outbox();
    assert_eq!(outbox.messages, vec![ClientMessage::auth("token")]);

    core.on_channel_event(ChannelEvent::Authenticated(user(1)), now);
    assert_eq!(core.take_outbox().messages, vec![ClientMessage::seek()]);
    assert_eq!(core.state(), SessionState::Seeking);

    let states: Vec<SessionState> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            MatchEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Authenticating,
            SessionState::Authenticated,
            SessionState::Seeking
        ]
    );
}

#[test]
fn first_push_applies_existing_moves() {
    let mut core = player(2);
    core.take_outbox();

    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(1, &["e2e4"], json!({}))),
        Instant::now(),
    );

    assert_eq!(core.state(), SessionState::Playing);
    assert_eq!(core.my_color(), Some(Side::Black));
    let view = core.view();
    assert_eq!(view.turn, Side::Black);
    assert_eq!(view.last_move, Some(mv("e2e4")));
    assert!(view
        .position
        .starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
}

#[test]
fn duplicate_push_is_idempotent() {
    let mut core = player(2);
    let events = record(&mut core);
    let push = snapshot(0, &["e2e4", "e7e5"], json!({}));

    core.on_channel_event(ChannelEvent::GameResponse(push.clone()), Instant::now());
    core.on_channel_event(ChannelEvent::GameResponse(push), Instant::now());

    assert_eq!(core.history().len(), 2);
    let applied = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, MatchEvent::MoveApplied { .. }))
        .count();
    assert_eq!(applied, 2);
}

#[test]
fn own_move_echo_is_not_reapplied() {
    let mut core = player(1);
    core.take_outbox();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(0, &[], json!({}))),
        Instant::now(),
    );

    core.submit_move(mv("g1f3")).unwrap();
    let outbox = core.take_outbox();
    assert_eq!(outbox.messages.len(), 1);
    assert_eq!(outbox.messages[0].mv, Some(mv("g1f3")));

    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(1, &["g1f3"], json!({}))),
        Instant::now(),
    );
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(0, &["g1f3", "d7d5"], json!({}))),
        Instant::now(),
    );

    let mut expected = ChessEngine::new();
    for m in ["g1f3", "d7d5"] {
        let normalized = expected.normalize_move(&mv(m)).unwrap();
        expected.play(normalized);
    }
    assert_eq!(core.position(), expected.export_position());
    assert!(core.history().iter().all(|entry| entry.confirmed));
}

#[test]
fn premove_fires_when_turn_arrives() {
    let mut core = player(2);
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(0, &[], json!({}))),
        Instant::now(),
    );
    core.take_outbox();

    // 第二个预走替换第一个
    core.set_premove(Some(Premove::new("e7".parse().unwrap(), "e5".parse().unwrap())));
    core.set_premove(Some(Premove::new("c7".parse().unwrap(), "c5".parse().unwrap())));
    assert_eq!(
        core.view().premove,
        Some(Premove::new("c7".parse().unwrap(), "c5".parse().unwrap()))
    );

    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(1, &["e2e4"], json!({}))),
        Instant::now(),
    );

    let outbox = core.take_outbox();
    assert_eq!(outbox.messages.len(), 1);
    assert_eq!(outbox.messages[0].action, Action::Move);
    assert_eq!(outbox.messages[0].mv, Some(mv("c7c5")));
    assert!(core.view().premove.is_none());
    assert_eq!(core.history().len(), 2);
}

#[test]
fn premove_waits_for_turn_and_dies_with_game() {
    let mut core = player(2);
    let now = Instant::now();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(0, &[], json!({}))),
        now,
    );
    core.take_outbox();
    let queued = Premove::new("e7".parse().unwrap(), "e5".parse().unwrap());
    core.set_premove(Some(queued));

    // 仍是对方走：保留预走，不发送
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(
            0,
            &[],
            json!({ "clocks": [{ "time": 179000, "active": true }, { "time": 180000, "active": false }] }),
        )),
        now,
    );
    assert!(sent_actions(&mut core).is_empty());
    assert_eq!(core.view().premove, Some(queued));

    // 已终局的推送即使轮到本方也不提交，预走随对局一起清除
    let finished = snapshot(1, &["e2e4"], json!({ "result": "1-0", "reason": 2 }));
    core.on_channel_event(ChannelEvent::GameResponse(finished.clone()), now);
    assert!(sent_actions(&mut core).iter().all(|a| *a != Action::Move));
    assert!(core.view().premove.is_none());
    assert_eq!(core.state(), SessionState::Exited);
    assert_eq!(core.view().exit_message.as_deref(), Some("alice won by resignation"));

    core.on_channel_event(ChannelEvent::GameExited(finished), now);
    assert!(sent_actions(&mut core).iter().all(|a| *a != Action::Move));
    assert_eq!(core.history().len(), 1);
}

#[test]
fn premove_dropped_on_exit_push() {
    let mut core = player(2);
    let now = Instant::now();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(0, &[], json!({}))),
        now,
    );
    core.take_outbox();
    core.set_premove(Some(Premove::new("g8".parse().unwrap(), "f6".parse().unwrap())));

    let finished = snapshot(1, &["e2e4"], json!({ "result": "1/2-1/2", "reason": 7 }));
    core.on_channel_event(ChannelEvent::GameExited(finished), now);

    assert!(sent_actions(&mut core).iter().all(|a| *a != Action::Move));
    assert!(core.view().premove.is_none());
    assert_eq!(core.view().exit_message.as_deref(), Some("Game drawn by agreement"));
}

#[test]
fn clocks_tick_for_side_to_move_only() {
    let mut core = player(1);
    let t0 = Instant::now();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(1, &["e2e4"], json!({}))),
        t0,
    );

    for step in 1..=5 {
        core.on_clock_tick(t0 + Duration::from_millis(100 * step));
    }
    let clocks = core.view().clocks;
    assert_eq!(clocks.white_ms, 180_000);
    assert_eq!(clocks.black_ms, 179_500);
}

#[test]
fn exit_freezes_clocks_and_reports() {
    let mut core = player(1);
    let events = record(&mut core);
    let t0 = Instant::now();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(1, &["e2e4"], json!({}))),
        t0,
    );
    core.set_premove(Some(Premove::new("d2".parse().unwrap(), "d4".parse().unwrap())));

    let finished = snapshot(
        0,
        &["e2e4", "f7f6"],
        json!({
            "result": "0-1",
            "reason": 1,
            "clocks": [{ "time": 0, "active": false }, { "time": 171234, "active": false }],
        }),
    );
    core.on_channel_event(ChannelEvent::GameExited(finished.clone()), t0);
    core.on_clock_tick(t0 + Duration::from_secs(5));

    let view = core.view();
    assert_eq!(view.state, SessionState::Exited);
    assert_eq!(view.exit_message.as_deref(), Some("bob won by timeout"));
    assert_eq!(view.clocks.white_ms, 0);
    assert_eq!(view.clocks.black_ms, 171_234);
    assert!(view.premove.is_none());
    assert_eq!(core.history().len(), 2);

    // 重复的结束推送被忽略，也不再发心跳
    core.on_channel_event(ChannelEvent::GameExited(finished), t0);
    core.on_ping_due(t0);
    assert!(sent_actions(&mut core).iter().all(|a| *a != Action::Ping));

    let exits = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, MatchEvent::Exited { .. }))
        .count();
    assert_eq!(exits, 1);
}

#[test]
fn low_time_alert_once_per_move() {
    let mut core = player(1);
    let events = record(&mut core);
    let t0 = Instant::now();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(
            0,
            &["e2e4", "e7e5"],
            json!({ "clocks": [{ "time": 60050, "active": true }, { "time": 90000, "active": false }] }),
        )),
        t0,
    );

    for step in 1..=5 {
        core.on_clock_tick(t0 + Duration::from_millis(100 * step));
    }
    let alerts = |events: &Arc<Mutex<Vec<MatchEvent>>>| {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MatchEvent::LowTimeAlert { .. }))
            .count()
    };
    assert_eq!(alerts(&events), 1);

    // 走一步后清除，再次轮到本方时可以重新提醒
    core.submit_move(mv("g1f3")).unwrap();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(
            0,
            &["e2e4", "e7e5", "g1f3", "b8c6"],
            json!({ "clocks": [{ "time": 59000, "active": true }, { "time": 88000, "active": false }] }),
        )),
        t0 + Duration::from_secs(1),
    );
    core.on_clock_tick(t0 + Duration::from_millis(1100));
    assert_eq!(alerts(&events), 2);
}

#[test]
fn server_error_requests_teardown() {
    let mut core = player(1);
    let events = record(&mut core);
    core.take_outbox();

    core.on_channel_event(ChannelEvent::Error("Invalid token".into()), Instant::now());
    let outbox = core.take_outbox();
    assert!(outbox.teardown);
    assert_eq!(outbox.fatal.as_deref(), Some("Invalid token"));
    assert!(events
        .lock()
        .unwrap()
        .contains(&MatchEvent::Error("Invalid token".into())));

    core.shutdown();
    core.on_channel_event(ChannelEvent::Pong, Instant::now());
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[test]
fn desync_surfaces_and_resync_recovers() {
    let mut core = player(1);
    let events = record(&mut core);
    let now = Instant::now();
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(1, &["e2e4"], json!({}))),
        now,
    );
    core.on_channel_event(
        ChannelEvent::GameResponse(snapshot(0, &["d2d4", "d7d5"], json!({}))),
        now,
    );
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, MatchEvent::Desync(_))));

    core.resync();
    assert_eq!(
        core.history().iter().map(|e| e.mv).collect::<Vec<_>>(),
        vec![mv("d2d4"), mv("d7d5")]
    );
    assert!(core.submit_move(mv("c2c4")).is_ok());
}
