//! 入站消息分发

use protocol::{GameState, ServerMessage, Side, Status, UserInfo};

/// 通道事件（按传输层到达顺序投递）
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// 连接已建立
    Opened,
    /// 服务端确认身份
    Authenticated(UserInfo),
    /// 对局快照（进行中）
    GameResponse(GameState),
    /// 一方提和
    DrawOffered { by: Side, game: GameState },
    /// 对局结束
    GameExited(GameState),
    /// 心跳响应
    Pong,
    /// 服务端错误（致命）
    Error(String),
    /// 连接关闭
    Closed { code: u16 },
}

/// 将一条服务端消息拆分为通道事件
///
/// 带 `game` 的消息只产生一个对局事件，优先级：结束 > 提和 > 普通快照。
/// `pong` 仅在没有 `game` 时生效；`user` 总是额外产生认证事件。
pub fn route(msg: ServerMessage) -> Vec<ChannelEvent> {
    let mut events = Vec::new();

    if msg.status == Status::Error {
        let message = msg
            .error
            .unwrap_or_else(|| "Unknown server error".to_string());
        events.push(ChannelEvent::Error(message));
        return events;
    }

    let has_pong = msg.has_pong();
    match msg.game {
        Some(game) if game.result.is_terminal() => events.push(ChannelEvent::GameExited(game)),
        Some(game) => match game.draw_offer {
            Some(by) => events.push(ChannelEvent::DrawOffered { by, game }),
            None => events.push(ChannelEvent::GameResponse(game)),
        },
        None if has_pong => events.push(ChannelEvent::Pong),
        None => {}
    }

    if let Some(user) = msg.user {
        events.push(ChannelEvent::Authenticated(user));
    }

    if events.is_empty() {
        tracing::debug!("Server message produced no events");
    }
    events
}
