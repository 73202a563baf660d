//! 走法对齐
//!
//! 服务端推送的走法列表是权威的、只追加的。本地历史只可能比它多出自己刚提交、
//! 还没被确认的那一步。每次推送比较双方在重叠处的最后一步，然后把服务端多出的
//! 走法依次应用到局面引擎上。一旦发现分叉就停下来，等待显式的重新同步。

use chrono::{DateTime, Utc};
use protocol::{GameState, Side, UciMove, STANDARD_START_FEN};

use crate::engine::{MaterialBalance, PositionEngine};
use crate::error::{DesyncError, ValidationError};

/// 历史记录中的一步
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub mv: UciMove,
    /// 走完这一步后的局面
    pub position: String,
    pub applied_at: DateTime<Utc>,
    /// 服务端是否已确认
    pub confirmed: bool,
}

/// 本次新应用的走法
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub index: usize,
    pub mv: UciMove,
    pub position: String,
}

/// 一次对齐的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub applied: Vec<AppliedMove>,
    pub desync: Option<DesyncError>,
}

impl ReconcileOutcome {
    fn desync(error: DesyncError) -> Self {
        Self {
            applied: Vec::new(),
            desync: Some(error),
        }
    }
}

/// 走法对齐器
pub struct Reconciler<E: PositionEngine> {
    engine: E,
    history: Vec<HistoryEntry>,
    start_position: String,
    /// 发生分叉后停止处理推送
    halted: bool,
    last_snapshot: Option<GameState>,
}

impl<E: PositionEngine> Reconciler<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            history: Vec::new(),
            start_position: STANDARD_START_FEN.to_string(),
            halted: false,
            last_snapshot: None,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn last_move(&self) -> Option<&UciMove> {
        self.history.last().map(|entry| &entry.mv)
    }

    /// 当前局面
    pub fn position(&self) -> String {
        self.engine.export_position()
    }

    /// 起始局面
    pub fn start_position(&self) -> &str {
        &self.start_position
    }

    pub fn turn(&self) -> Side {
        self.engine.turn()
    }

    pub fn material(&self) -> MaterialBalance {
        self.engine.material()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 将服务端快照对齐到本地
    pub fn reconcile(&mut self, game: &GameState) -> ReconcileOutcome {
        self.last_snapshot = Some(game.clone());
        if self.halted {
            tracing::debug!("Reconciler halted, ignoring push for game {}", game.id);
            return ReconcileOutcome::default();
        }

        let server = &game.moves;
        let local_len = self.history.len();

        let outcome = if local_len == 0 {
            let start = self.choose_start(game);
            if self.engine.init_from_position(&start).is_err() {
                return self.halt(DesyncError::BadStartPosition { position: start });
            }
            self.start_position = start;
            self.apply_tail(server, 0)
        } else if server.len() >= local_len {
            if let Some(error) = self.check_overlap(server, local_len - 1) {
                return self.halt(error);
            }
            self.apply_tail(server, local_len)
        } else {
            // 本地刚走的一步还没回显
            if !server.is_empty() {
                if let Some(error) = self.check_overlap(server, server.len() - 1) {
                    return self.halt(error);
                }
            }
            ReconcileOutcome::default()
        };

        for entry in self.history.iter_mut().take(server.len()) {
            entry.confirmed = true;
        }
        outcome
    }

    /// 起始局面：settings.startPos 优先；尚无走法时用 fen；
    /// 否则沿用已经建立的局面（初始为标准局面）
    fn choose_start(&self, game: &GameState) -> String {
        if let Some(start) = game.start_position() {
            return start.to_string();
        }
        match &game.fen {
            Some(fen) if game.moves.is_empty() => fen.clone(),
            _ => self.start_position.clone(),
        }
    }

    fn parse_server_move(index: usize, raw: &str) -> Result<UciMove, DesyncError> {
        raw.parse().map_err(|_| DesyncError::UnreadableMove {
            index,
            raw: raw.to_string(),
        })
    }

    fn check_overlap(&self, server: &[String], index: usize) -> Option<DesyncError> {
        let local = self.history[index].mv;
        let remote = match Self::parse_server_move(index, &server[index]) {
            Ok(mv) => mv,
            Err(error) => return Some(error),
        };
        (local != remote).then_some(DesyncError::Diverged {
            index,
            local,
            server: remote,
        })
    }

    fn apply_tail(&mut self, server: &[String], from: usize) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        for (index, text) in server.iter().enumerate().skip(from) {
            let raw = match Self::parse_server_move(index, text) {
                Ok(mv) => mv,
                Err(error) => {
                    tracing::warn!("{}", error);
                    self.halted = true;
                    outcome.desync = Some(error);
                    break;
                }
            };
            let Some(mv) = self
                .engine
                .normalize_move(&raw)
                .filter(|mv| self.engine.is_legal(mv))
            else {
                let error = DesyncError::IllegalTail { index, mv: raw };
                tracing::warn!("{}", error);
                self.halted = true;
                outcome.desync = Some(error);
                break;
            };
            self.engine.play(mv);
            let position = self.engine.export_position();
            self.history.push(HistoryEntry {
                mv: raw,
                position: position.clone(),
                applied_at: Utc::now(),
                confirmed: true,
            });
            outcome.applied.push(AppliedMove {
                index,
                mv: raw,
                position,
            });
        }
        outcome
    }

    fn halt(&mut self, error: DesyncError) -> ReconcileOutcome {
        tracing::warn!("{}", error);
        self.halted = true;
        ReconcileOutcome::desync(error)
    }

    /// 本地走法（乐观应用，等待服务端确认）
    pub fn apply_local(&mut self, raw: &UciMove) -> Result<AppliedMove, ValidationError> {
        let mv = self
            .engine
            .normalize_move(raw)
            .ok_or(ValidationError::Unparsable)?;
        if !self.engine.is_legal(&mv) {
            return Err(ValidationError::Illegal);
        }
        self.engine.play(mv);
        let position = self.engine.export_position();
        self.history.push(HistoryEntry {
            mv: *raw,
            position: position.clone(),
            applied_at: Utc::now(),
            confirmed: false,
        });
        Ok(AppliedMove {
            index: self.history.len() - 1,
            mv: *raw,
            position,
        })
    }

    /// 丢弃本地历史，用最近一次快照从头重建
    pub fn resync(&mut self) -> ReconcileOutcome {
        tracing::info!("Resyncing from the latest snapshot");
        self.halted = false;
        self.history.clear();
        match self.last_snapshot.take() {
            Some(snapshot) => self.reconcile(&snapshot),
            None => ReconcileOutcome::default(),
        }
    }
}
