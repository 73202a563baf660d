//! 对局同步共享协议库
//!
//! 包含:
//! - 阵营、格子、走法等基础类型
//! - 服务端对局快照（GameState）
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 传输层抽象 (Connector, FrameSink, FrameSource traits) 与 WebSocket 实现

mod constants;
mod error;
mod game;
mod message;
mod moves;
mod piece;
mod transport;

pub use constants::*;
pub use error::{ProtocolError, Result};
pub use game::{
    ClockState, EndReason, EntityId, GameId, GameResult, GameSettings, GameState, PlayerId,
    PlayerInfo, UserInfo,
};
pub use message::{Action, ClientMessage, ServerMessage, Status};
pub use moves::UciMove;
pub use piece::{PieceKind, Promotion, Side, Square};
pub use transport::{
    parse_socket_url, Connector, Frame, FrameSink, FrameSource, WsConnector, WsFrameReader,
    WsFrameWriter,
};
