//! 同步引擎错误类型

use protocol::{ProtocolError, UciMove};
use thiserror::Error;

/// 对齐失败（本地与权威状态分叉）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DesyncError {
    /// 同一位置上本地走法与服务端不同
    #[error("History diverged at ply {index}: local {local}, server {server}")]
    Diverged {
        index: usize,
        local: UciMove,
        server: UciMove,
    },

    /// 服务端追加的走法在本地局面下不合法
    #[error("Server move {mv} at ply {index} is illegal in the local position")]
    IllegalTail { index: usize, mv: UciMove },

    /// 服务端走法字符串无法解析
    #[error("Server move {raw:?} at ply {index} cannot be parsed")]
    UnreadableMove { index: usize, raw: String },

    /// 起始局面无法加载
    #[error("Cannot load start position: {position}")]
    BadStartPosition { position: String },
}

/// 本地走法校验失败（不发送、不修改历史）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// 对局尚未开始或已结束
    #[error("Not playing")]
    NotPlaying,

    /// 观战者不能走棋
    #[error("Spectators cannot move")]
    Spectating,

    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 引擎无法识别该走法
    #[error("Move cannot be normalized")]
    Unparsable,

    /// 走法不合法
    #[error("Illegal move")]
    Illegal,
}

/// 同步引擎错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 传输层错误（由重连策略处理，不致命）
    #[error("Transport error: {0}")]
    Transport(#[from] ProtocolError),

    /// 服务端返回 error 状态（致命）
    #[error("Server error: {message}")]
    Server { message: String },

    /// 对齐失败
    #[error("Desync: {0}")]
    Desync(#[from] DesyncError),

    /// 本地校验失败
    #[error("Validation: {0}")]
    Validation(#[from] ValidationError),
}

/// 同步引擎结果类型
pub type Result<T> = std::result::Result<T, SyncError>;
