//! 棋钟
//!
//! 以服务端快照为准，两次快照之间在本地按固定周期递减走子方的时间。

use protocol::{ClockState, Side, LOW_TIME_THRESHOLD_MS};
use tokio::time::Instant;

/// 对外展示的时钟快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub white_ms: u64,
    pub black_ms: u64,
    pub active: bool,
    pub received_at: Option<Instant>,
}

/// 一次刷新的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// 时间有变化
    pub changed: bool,
    /// 本次刷新触发了低时间提醒
    pub low_time: bool,
}

/// 棋钟模型
#[derive(Debug, Clone)]
pub struct ClockModel {
    /// [白方, 黑方] 剩余毫秒
    remaining: [u64; 2],
    active: bool,
    turn: Side,
    received_at: Option<Instant>,
    last_tick: Option<Instant>,
    frozen: bool,
    low_time_threshold_ms: u64,
    low_time_alerted: bool,
}

impl Default for ClockModel {
    fn default() -> Self {
        Self::new(LOW_TIME_THRESHOLD_MS)
    }
}

impl ClockModel {
    pub fn new(low_time_threshold_ms: u64) -> Self {
        Self {
            remaining: [0, 0],
            active: false,
            turn: Side::White,
            received_at: None,
            last_tick: None,
            frozen: false,
            low_time_threshold_ms,
            low_time_alerted: false,
        }
    }

    pub fn remaining(&self, side: Side) -> u64 {
        self.remaining[side.index()]
    }

    pub fn is_active(&self) -> bool {
        self.active && !self.frozen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn low_time_alerted(&self) -> bool {
        self.low_time_alerted
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            white_ms: self.remaining[0],
            black_ms: self.remaining[1],
            active: self.is_active(),
            received_at: self.received_at,
        }
    }

    /// 用服务端快照替换本地时间
    pub fn apply(&mut self, clocks: &[ClockState], turn: Side, now: Instant) {
        if self.frozen {
            return;
        }
        self.turn = turn;
        if let [white, black, ..] = clocks {
            self.remaining = [white.time_ms, black.time_ms];
            self.active = white.active || black.active;
            self.received_at = Some(now);
            self.last_tick = Some(now);
        }
    }

    /// 本地刷新：从走子方扣除距上次刷新经过的时间
    ///
    /// `local` 为本地玩家的阵营，观战者传 None（不会触发低时间提醒）。
    pub fn tick(&mut self, now: Instant, local: Option<Side>) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !self.is_active() {
            return outcome;
        }

        let since = self.last_tick.unwrap_or(now);
        let elapsed = now.saturating_duration_since(since).as_millis() as u64;
        self.last_tick = Some(now);

        let slot = &mut self.remaining[self.turn.index()];
        let before = *slot;
        *slot = slot.saturating_sub(elapsed);
        outcome.changed = *slot != before;

        if local == Some(self.turn)
            && !self.low_time_alerted
            && *slot <= self.low_time_threshold_ms
        {
            self.low_time_alerted = true;
            outcome.low_time = true;
        }
        outcome
    }

    /// 清除低时间提醒（新的一步或新的对局）
    pub fn clear_low_time(&mut self) {
        self.low_time_alerted = false;
    }

    /// 对局结束：停止计时并固定为服务端给出的最终时间
    pub fn freeze(&mut self, clocks: &[ClockState]) {
        if let [white, black, ..] = clocks {
            self.remaining = [white.time_ms, black.time_ms];
        }
        self.active = false;
        self.frozen = true;
    }
}
