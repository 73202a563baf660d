//! 对局同步逻辑
//!
//! 状态机、走法对齐、棋钟、预走、延迟探测，以及把它们串起来的 [`MatchCore`]
//! 和驱动它的异步 [`MatchSession`]。

mod clock;
mod latency;
mod lifecycle;
mod premove;
mod reconcile;
mod session;
mod state;

pub use clock::*;
pub use latency::*;
pub use lifecycle::*;
pub use premove::*;
pub use reconcile::*;
pub use session::*;
pub use state::*;

use std::time::Duration;

use protocol::{Side, UciMove};

use crate::error::DesyncError;

/// 表现层发来的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 走棋
    SubmitMove(UciMove),
    /// 设置或清除预走
    SetPremove(Option<Premove>),
    /// 提和
    OfferDraw,
    /// 响应对方提和
    RespondDraw(bool),
    /// 认输
    Resign,
    /// 停止观战
    StopSpectating,
    /// 重新连接（已连接时无效）
    Reconnect,
    /// 查看历史局面
    ShowPast(usize),
    /// 分叉后从最近快照重建
    Resync,
    /// 离开对局
    Leave,
}

/// 发给表现层的事件
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    /// 会话状态变化
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// 局面上应用了一步
    MoveApplied {
        index: usize,
        mv: UciMove,
        position: String,
        /// 本地提交的走法
        local: bool,
    },
    /// 棋钟刷新
    ClockTick(ClockSnapshot),
    /// 本方时间不足
    LowTimeAlert { remaining_ms: u64 },
    /// 延迟更新
    LatencyUpdated {
        latency: Duration,
        quality: LatencyQuality,
    },
    /// 一方提和
    DrawOffered { by: Side },
    /// 对局结束
    Exited { message: String },
    /// 本地与服务端分叉
    Desync(DesyncError),
    /// 服务端错误（会话随后拆除）
    Error(String),
    /// 历史局面
    PastPositionShown {
        index: usize,
        mv: UciMove,
        position: String,
    },
}
