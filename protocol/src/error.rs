//! 错误类型定义

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// WebSocket 错误
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// 无效的服务器地址
    #[error("Invalid socket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 无法解析的走法字符串
    #[error("Invalid move string: {raw:?}")]
    InvalidMove { raw: String },

    /// 无效的阵营编号（只能是 0 或 1）
    #[error("Invalid side index: {0}")]
    InvalidSide(u8),

    /// 无效的终局原因编号
    #[error("Invalid end reason: {0}")]
    InvalidEndReason(u8),
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
