//! 对局核心状态
//!
//! [`MatchCore`] 拥有全部对局状态，只在处理一个事件的过程中被修改。
//! 它本身不做任何 I/O：要发送的消息和连接动作收集在 [`Outbox`] 里，
//! 由驱动方在每次处理完事件后统一发出。

use std::time::Duration;

use protocol::{
    ClientMessage, GameId, GameState, PlayerInfo, Side, UciMove, LOW_TIME_THRESHOLD_MS,
};
use serde_json::Value;
use tokio::time::Instant;

use super::clock::{ClockModel, ClockSnapshot};
use super::latency::{LatencyProber, LatencyQuality};
use super::lifecycle::{Lifecycle, Role, SessionState};
use super::premove::{Premove, PremoveQueue};
use super::reconcile::{AppliedMove, HistoryEntry, ReconcileOutcome, Reconciler};
use super::{Command, MatchEvent};
use crate::engine::{MaterialBalance, PositionEngine};
use crate::error::{SyncError, ValidationError};
use crate::events::{EventBus, ListenerId};
use crate::network::ChannelEvent;

/// 对局参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOptions {
    pub role: Role,
    pub auth_token: Option<String>,
    /// 要加入或观战的对局
    pub target_match: Option<GameId>,
    pub low_time_threshold_ms: u64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            role: Role::Player,
            auth_token: None,
            target_match: None,
            low_time_threshold_ms: LOW_TIME_THRESHOLD_MS,
        }
    }
}

/// 待发出的输出
#[derive(Debug, Default)]
pub struct Outbox {
    pub messages: Vec<ClientMessage>,
    /// 需要重新连接
    pub reconnect: bool,
    /// 需要拆除会话
    pub teardown: bool,
    /// 致命的服务端错误
    pub fatal: Option<String>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && !self.reconnect && !self.teardown
    }
}

/// 只读视图
#[derive(Debug, Clone)]
pub struct MatchView {
    pub state: SessionState,
    pub game_id: Option<GameId>,
    pub players: Vec<PlayerInfo>,
    pub my_color: Option<Side>,
    pub spectator: bool,
    pub turn: Side,
    pub clocks: ClockSnapshot,
    pub history: Vec<HistoryEntry>,
    pub start_position: String,
    pub position: String,
    pub last_move: Option<UciMove>,
    pub legal_moves: Option<Value>,
    pub premove: Option<Premove>,
    /// 对方向本方提和，等待回应
    pub asking_draw: bool,
    pub latency: Option<Duration>,
    pub latency_quality: Option<LatencyQuality>,
    pub exit_message: Option<String>,
    pub material: MaterialBalance,
    pub meeting: Option<Value>,
    pub tournament: Option<Value>,
}

/// 对局核心
pub struct MatchCore<E: PositionEngine> {
    lifecycle: Lifecycle,
    reconciler: Reconciler<E>,
    clock: ClockModel,
    premove: PremoveQueue,
    latency: LatencyProber,
    /// 最近一次快照
    game: Option<GameState>,
    my_color: Option<Side>,
    asking_draw: bool,
    exit_message: Option<String>,
    outbox: Outbox,
    events: EventBus<MatchEvent>,
}

impl<E: PositionEngine> MatchCore<E> {
    pub fn new(engine: E, options: MatchOptions) -> Self {
        Self {
            lifecycle: Lifecycle::new(options.role, options.auth_token, options.target_match),
            reconciler: Reconciler::new(engine),
            clock: ClockModel::new(options.low_time_threshold_ms),
            premove: PremoveQueue::new(),
            latency: LatencyProber::new(),
            game: None,
            my_color: None,
            asking_draw: false,
            exit_message: None,
            outbox: Outbox::default(),
            events: EventBus::new(),
        }
    }

    // ========================================================================
    // 观察者
    // ========================================================================

    pub fn subscribe<F>(&mut self, handler: F) -> ListenerId
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// 拆除时注销全部处理器
    pub fn shutdown(&mut self) {
        self.events.clear();
    }

    fn emit(&mut self, event: MatchEvent) {
        self.events.emit(&event);
    }

    /// 取出本轮累计的输出
    pub fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, msg: ClientMessage) {
        self.outbox.messages.push(msg);
    }

    fn flush_transitions(&mut self) {
        for t in self.lifecycle.drain_transitions() {
            self.emit(MatchEvent::StateChanged {
                from: t.from,
                to: t.to,
            });
        }
    }

    // ========================================================================
    // 只读访问
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn my_color(&self) -> Option<Side> {
        self.my_color
    }

    pub fn game_id(&self) -> Option<&GameId> {
        self.lifecycle.game_id()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        self.reconciler.history()
    }

    pub fn position(&self) -> String {
        self.reconciler.position()
    }

    pub fn view(&self) -> MatchView {
        let game = self.game.as_ref();
        MatchView {
            state: self.lifecycle.state(),
            game_id: self.lifecycle.game_id().cloned(),
            players: game.map(|g| g.players.clone()).unwrap_or_default(),
            my_color: self.my_color,
            spectator: self.lifecycle.is_spectator(),
            turn: self.reconciler.turn(),
            clocks: self.clock.snapshot(),
            history: self.reconciler.history().to_vec(),
            start_position: self.reconciler.start_position().to_string(),
            position: self.reconciler.position(),
            last_move: self.reconciler.last_move().copied(),
            legal_moves: game.and_then(|g| g.legal_moves.clone()),
            premove: self.premove.peek().copied(),
            asking_draw: self.asking_draw,
            latency: self.latency.latency(),
            latency_quality: self.latency.quality(),
            exit_message: self.exit_message.clone(),
            material: self.reconciler.material(),
            meeting: game.and_then(|g| g.meeting.clone()),
            tournament: game.and_then(|g| g.tournament.clone()),
        }
    }

    // ========================================================================
    // 通道事件
    // ========================================================================

    pub fn on_channel_event(&mut self, event: ChannelEvent, now: Instant) {
        match event {
            ChannelEvent::Opened => {
                if let Some(msg) = self.lifecycle.on_opened() {
                    self.send(msg);
                }
                self.flush_transitions();
            }
            ChannelEvent::Authenticated(user) => {
                if let Some(msg) = self.lifecycle.on_authenticated(user) {
                    self.send(msg);
                }
                // 同一条消息里的快照先于认证处理
                if let Some(game) = self.game.take() {
                    self.resolve_color(&game);
                    self.game = Some(game);
                }
                self.flush_transitions();
            }
            ChannelEvent::GameResponse(game) => self.on_game(game, now),
            ChannelEvent::DrawOffered { by, game } => {
                self.on_game(game, now);
                if self.lifecycle.is_exited() {
                    return;
                }
                if self.my_color.is_some_and(|me| me != by) {
                    self.asking_draw = true;
                }
                self.emit(MatchEvent::DrawOffered { by });
            }
            ChannelEvent::GameExited(game) => self.on_exit(game),
            ChannelEvent::Pong => {
                if let Some(latency) = self.latency.on_pong(now) {
                    self.emit(MatchEvent::LatencyUpdated {
                        latency,
                        quality: LatencyQuality::from_latency(latency),
                    });
                }
            }
            ChannelEvent::Error(message) => {
                tracing::error!("Server error: {}", message);
                self.emit(MatchEvent::Error(message.clone()));
                self.outbox.teardown = true;
                self.outbox.fatal = Some(message);
            }
            ChannelEvent::Closed { code } => {
                tracing::debug!("Channel closed with code {}", code);
            }
        }
    }

    fn resolve_color(&mut self, game: &GameState) {
        if self.lifecycle.is_spectator() || self.my_color.is_some() {
            return;
        }
        if let Some(user) = self.lifecycle.user() {
            self.my_color = game.side_of(&user.id);
            if let Some(side) = self.my_color {
                tracing::info!("Playing as {}", side.name());
            }
        }
    }

    fn on_game(&mut self, game: GameState, now: Instant) {
        if self.lifecycle.is_exited() {
            tracing::debug!("Ignoring push after exit");
            return;
        }
        if game.result.is_terminal() {
            self.on_exit(game);
            return;
        }

        let new_game = self.game.as_ref().map(|g| &g.id) != Some(&game.id);
        if new_game {
            tracing::info!("Game {} with {} moves", game.id, game.moves.len());
            self.clock.clear_low_time();
        }

        self.resolve_color(&game);
        self.lifecycle.on_game(&game);
        self.flush_transitions();

        let outcome = self.reconciler.reconcile(&game);
        self.report(outcome);
        self.clock.apply(&game.clocks, game.turn, now);

        let my_turn = self.my_color == Some(game.turn);
        self.game = Some(game);

        if my_turn && !self.lifecycle.is_spectator() {
            if let Some(premove) = self.premove.take() {
                tracing::debug!("Submitting premove {}", premove.to_move());
                if let Err(e) = self.submit_move(premove.to_move()) {
                    tracing::debug!("Premove rejected: {}", e);
                }
            }
        }
    }

    fn on_exit(&mut self, game: GameState) {
        if self.lifecycle.is_exited() {
            tracing::debug!("Duplicate exit for game {}", game.id);
            return;
        }

        self.resolve_color(&game);
        let outcome = self.reconciler.reconcile(&game);
        self.report(outcome);

        self.lifecycle.on_game(&game);
        self.lifecycle.exit();
        self.flush_transitions();

        self.clock.freeze(&game.clocks);
        self.premove.clear();
        self.asking_draw = false;

        let message = exit_message(&game);
        tracing::info!("{}", message);
        self.exit_message = Some(message.clone());
        self.game = Some(game);
        self.emit(MatchEvent::Exited { message });
    }

    fn report(&mut self, outcome: ReconcileOutcome) {
        if !outcome.applied.is_empty() {
            self.clock.clear_low_time();
        }
        for applied in outcome.applied {
            self.emit_applied(applied, false);
        }
        if let Some(error) = outcome.desync {
            self.emit(MatchEvent::Desync(error));
        }
    }

    fn emit_applied(&mut self, applied: AppliedMove, local: bool) {
        self.emit(MatchEvent::MoveApplied {
            index: applied.index,
            mv: applied.mv,
            position: applied.position,
            local,
        });
    }

    // ========================================================================
    // 定时器
    // ========================================================================

    /// 100ms 棋钟刷新
    pub fn on_clock_tick(&mut self, now: Instant) {
        let local = if self.lifecycle.is_spectator() {
            None
        } else {
            self.my_color
        };
        let outcome = self.clock.tick(now, local);
        if outcome.changed {
            self.emit(MatchEvent::ClockTick(self.clock.snapshot()));
        }
        if let (true, Some(side)) = (outcome.low_time, local) {
            let remaining_ms = self.clock.remaining(side);
            self.emit(MatchEvent::LowTimeAlert { remaining_ms });
        }
    }

    /// 10s 心跳
    pub fn on_ping_due(&mut self, now: Instant) {
        if self.lifecycle.is_exited() {
            return;
        }
        self.send(ClientMessage::ping());
        self.latency.on_ping_sent(now);
    }

    // ========================================================================
    // 命令
    // ========================================================================

    pub fn handle_command(&mut self, command: Command) -> Result<(), SyncError> {
        match command {
            Command::SubmitMove(mv) => {
                self.submit_move(mv)?;
            }
            Command::SetPremove(premove) => self.set_premove(premove),
            Command::OfferDraw => self.offer_draw(),
            Command::RespondDraw(accept) => self.respond_draw(accept),
            Command::Resign => self.resign(),
            Command::StopSpectating => self.stop_spectating(),
            Command::Reconnect => self.reconnect(),
            Command::ShowPast(index) => self.show_past(index),
            Command::Resync => self.resync(),
            Command::Leave => self.leave(),
        }
        Ok(())
    }

    /// 走棋：乐观应用并发送
    pub fn submit_move(&mut self, mv: UciMove) -> Result<AppliedMove, ValidationError> {
        let result = self.validate_and_apply(mv);
        match &result {
            Ok(applied) => {
                self.premove.clear();
                self.asking_draw = false;
                self.clock.clear_low_time();
                self.emit_applied(applied.clone(), true);
                let game = self.game_id().cloned();
                self.send(ClientMessage::make_move(game, mv));
            }
            Err(e) => tracing::debug!("Move {} rejected: {}", mv, e),
        }
        result
    }

    fn validate_and_apply(&mut self, mv: UciMove) -> Result<AppliedMove, ValidationError> {
        if self.lifecycle.is_spectator() {
            return Err(ValidationError::Spectating);
        }
        if self.lifecycle.state() != SessionState::Playing || self.reconciler.is_halted() {
            return Err(ValidationError::NotPlaying);
        }
        if self.my_color != Some(self.reconciler.turn()) {
            return Err(ValidationError::NotYourTurn);
        }
        self.reconciler.apply_local(&mv)
    }

    /// 设置预走（None 清除）
    pub fn set_premove(&mut self, premove: Option<Premove>) {
        if self.lifecycle.is_spectator() || self.lifecycle.state() != SessionState::Playing {
            tracing::debug!("Premove ignored in state {}", self.lifecycle.state());
            return;
        }
        match premove {
            Some(p) => {
                self.premove.set(p);
            }
            None => {
                self.premove.clear();
            }
        }
    }

    pub fn offer_draw(&mut self) {
        let game = self.game_id().cloned();
        self.send(ClientMessage::draw_offer(game));
    }

    pub fn respond_draw(&mut self, accept: bool) {
        self.asking_draw = false;
        let game = self.game_id().cloned();
        self.send(ClientMessage::draw_response(game, accept));
    }

    pub fn resign(&mut self) {
        let game = self.game_id().cloned();
        self.send(ClientMessage::resign(game));
    }

    pub fn stop_spectating(&mut self) {
        let game = self.game_id().cloned();
        self.send(ClientMessage::stop_spectating(game));
    }

    pub fn reconnect(&mut self) {
        self.outbox.reconnect = true;
    }

    /// 查看第 index 步之后的局面，同时取消预走
    pub fn show_past(&mut self, index: usize) {
        let Some(entry) = self.reconciler.history().get(index) else {
            tracing::debug!("No history entry at {}", index);
            return;
        };
        let event = MatchEvent::PastPositionShown {
            index,
            mv: entry.mv,
            position: entry.position.clone(),
        };
        self.premove.clear();
        self.emit(event);
    }

    /// 分叉后重建
    pub fn resync(&mut self) {
        let outcome = self.reconciler.resync();
        self.report(outcome);
    }

    /// 离开对局；观战者先通知服务端
    pub fn leave(&mut self) {
        if self.lifecycle.is_spectator() && self.game_id().is_some() && !self.lifecycle.is_exited()
        {
            self.stop_spectating();
        }
        self.outbox.teardown = true;
    }
}

/// 结束提示
pub fn exit_message(game: &GameState) -> String {
    let reason = game.reason.map(|r| r.describe());
    match (game.result.winner(), reason) {
        (None, Some(reason)) => format!("Game drawn by {reason}"),
        (None, None) => "Game drawn".to_string(),
        (Some(side), reason) => {
            let name = game
                .player(side)
                .map(|p| p.name.as_str())
                .filter(|name| !name.is_empty())
                .unwrap_or(side.name());
            match reason {
                Some(reason) => format!("{name} won by {reason}"),
                None => format!("{name} won"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChessEngine;
    use protocol::{Action, UserInfo};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn user(id: u64) -> UserInfo {
        serde_json::from_value(json!({ "id": id, "guest": false })).unwrap()
    }

    fn game(value: serde_json::Value) -> GameState {
        serde_json::from_value(value).unwrap()
    }

    fn players() -> serde_json::Value {
        json!([{ "id": 1, "name": "alice" }, { "id": 2, "name": "bob" }])
    }

    fn recorder(core: &mut MatchCore<ChessEngine>) -> Arc<Mutex<Vec<MatchEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        core.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        seen
    }

    /// 白方 alice 已进入对局
    fn playing_as_white() -> MatchCore<ChessEngine> {
        let mut core = MatchCore::new(
            ChessEngine::new(),
            MatchOptions {
                auth_token: Some("tok".into()),
                ..MatchOptions::default()
            },
        );
        let now = Instant::now();
        core.on_channel_event(ChannelEvent::Opened, now);
        core.on_channel_event(ChannelEvent::Authenticated(user(1)), now);
        core.on_channel_event(
            ChannelEvent::GameResponse(game(json!({
                "id": 10, "turn": 0, "players": players(), "moves": [],
                "clocks": [{ "time": 300000, "active": false }, { "time": 300000, "active": false }],
            }))),
            now,
        );
        core.take_outbox();
        core
    }

    #[test]
    fn test_color_and_state() {
        let core = playing_as_white();
        assert_eq!(core.state(), SessionState::Playing);
        assert_eq!(core.my_color(), Some(Side::White));
        assert_eq!(core.game_id().map(|id| id.as_str()), Some("10"));
    }

    #[test]
    fn test_submit_move_sends_and_applies() {
        let mut core = playing_as_white();
        let events = recorder(&mut core);

        let applied = core.submit_move("e2e4".parse().unwrap()).unwrap();
        assert_eq!(applied.index, 0);

        let outbox = core.take_outbox();
        assert_eq!(outbox.messages.len(), 1);
        assert_eq!(outbox.messages[0].action, Action::Move);
        assert_eq!(outbox.messages[0].game.as_ref().unwrap().as_str(), "10");
        assert!(matches!(
            events.lock().unwrap().as_slice(),
            [MatchEvent::MoveApplied { local: true, .. }]
        ));

        // 轮到黑方时不能再走
        assert_eq!(
            core.submit_move("d2d4".parse().unwrap()),
            Err(ValidationError::NotYourTurn)
        );
        assert!(core.take_outbox().messages.is_empty());
        assert_eq!(core.history().len(), 1);
    }

    #[test]
    fn test_illegal_move_is_silent() {
        let mut core = playing_as_white();
        assert_eq!(
            core.submit_move("e2e5".parse().unwrap()),
            Err(ValidationError::Illegal)
        );
        assert!(core.take_outbox().is_empty());
    }

    #[test]
    fn test_draw_offer_flag() {
        let mut core = playing_as_white();
        let events = recorder(&mut core);
        core.on_channel_event(
            ChannelEvent::DrawOffered {
                by: Side::Black,
                game: game(json!({ "id": 10, "turn": 0, "players": players(), "drawOffer": 1 })),
            },
            Instant::now(),
        );
        assert!(core.view().asking_draw);
        assert!(events
            .lock()
            .unwrap()
            .contains(&MatchEvent::DrawOffered { by: Side::Black }));

        core.respond_draw(false);
        assert!(!core.view().asking_draw);
        let outbox = core.take_outbox();
        assert_eq!(outbox.messages[0].action, Action::DrawResponse);
        assert_eq!(outbox.messages[0].accept, Some(false));
    }

    #[test]
    fn test_error_is_fatal() {
        let mut core = playing_as_white();
        core.on_channel_event(ChannelEvent::Error("Game not found".into()), Instant::now());
        let outbox = core.take_outbox();
        assert!(outbox.teardown);
        assert_eq!(outbox.fatal.as_deref(), Some("Game not found"));
    }

    #[test]
    fn test_ping_and_pong() {
        let mut core = playing_as_white();
        let t0 = Instant::now();
        core.on_ping_due(t0);
        assert_eq!(core.take_outbox().messages, vec![ClientMessage::ping()]);

        core.on_channel_event(ChannelEvent::Pong, t0 + Duration::from_millis(250));
        let view = core.view();
        assert_eq!(view.latency, Some(Duration::from_millis(250)));
        assert_eq!(view.latency_quality, Some(LatencyQuality::Fair));
    }

    #[test]
    fn test_show_past_cancels_premove() {
        let mut core = playing_as_white();
        core.submit_move("e2e4".parse().unwrap()).unwrap();
        core.set_premove(Some(Premove::new(
            "d2".parse().unwrap(),
            "d4".parse().unwrap(),
        )));
        assert!(core.view().premove.is_some());

        let events = recorder(&mut core);
        core.show_past(0);
        assert!(core.view().premove.is_none());
        assert!(matches!(
            events.lock().unwrap().as_slice(),
            [MatchEvent::PastPositionShown { index: 0, .. }]
        ));

        core.show_past(5);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_exit_messages() {
        let draw = game(json!({ "id": 1, "turn": 0, "result": "1/2-1/2", "reason": 6 }));
        assert_eq!(exit_message(&draw), "Game drawn by fifty move");

        let win = game(json!({
            "id": 1, "turn": 1, "result": "0-1", "reason": 2, "players": players(),
        }));
        assert_eq!(exit_message(&win), "bob won by resignation");

        let anonymous = game(json!({ "id": 1, "turn": 1, "result": "1-0", "reason": 0 }));
        assert_eq!(exit_message(&anonymous), "White won by checkmate");
    }

    #[test]
    fn test_spectator_leave_stops_spectating() {
        let mut core = MatchCore::new(
            ChessEngine::new(),
            MatchOptions {
                role: Role::Spectator,
                target_match: Some("10".into()),
                ..MatchOptions::default()
            },
        );
        core.on_channel_event(ChannelEvent::Authenticated(user(5)), Instant::now());
        assert_eq!(core.take_outbox().messages, vec![ClientMessage::join("10".into())]);
        assert_eq!(
            core.submit_move("e2e4".parse().unwrap()),
            Err(ValidationError::Spectating)
        );

        core.leave();
        let outbox = core.take_outbox();
        assert!(outbox.teardown);
        assert_eq!(outbox.messages[0].action, Action::StopSpectate);
    }
}
