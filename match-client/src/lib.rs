//! 对局同步客户端
//!
//! 让本地棋盘与服务端权威对局保持一致：连接与重连、走法对齐、棋钟插值、预走。
//! 国际象棋规则由 [`PositionEngine`] 提供，默认实现为 [`ChessEngine`]。

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod game;
pub mod network;

pub use config::{ClientConfig, LogLevel, TimingConfig};
pub use engine::{ChessEngine, InvalidPosition, MaterialBalance, PositionEngine};
pub use error::{DesyncError, Result, SyncError, ValidationError};
pub use events::{EventBus, ListenerId};
pub use game::{
    Command, MatchCore, MatchEvent, MatchHandle, MatchOptions, MatchSession, MatchView, Outbox,
    Premove, Role, SessionState, SessionTiming,
};
pub use network::{route, ChannelEvent, ChannelTiming, GameChannel, LinkStatus};
