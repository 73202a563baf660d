//! 消息类型定义
//!
//! 客户端 → 服务端：`{action, game?, token?, move?, accept?}`
//! 服务端 → 客户端：`{status, game?, pong?, user?, error?}`

use serde::{Deserialize, Serialize};

use crate::game::{GameId, GameState, UserInfo};
use crate::moves::UciMove;

/// 客户端动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Ping,
    Auth,
    Seek,
    Join,
    Spectate,
    Status,
    Move,
    DrawOffer,
    DrawResponse,
    Resign,
    #[serde(rename = "stopSpectating")]
    StopSpectate,
}

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub mv: Option<UciMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<bool>,
}

impl ClientMessage {
    fn bare(action: Action) -> Self {
        Self {
            action,
            game: None,
            token: None,
            mv: None,
            accept: None,
        }
    }

    fn for_game(action: Action, game: Option<GameId>) -> Self {
        Self {
            game,
            ..Self::bare(action)
        }
    }

    /// 心跳请求
    pub fn ping() -> Self {
        Self::bare(Action::Ping)
    }

    /// 身份认证
    pub fn auth(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::bare(Action::Auth)
        }
    }

    /// 寻找对手
    pub fn seek() -> Self {
        Self::bare(Action::Seek)
    }

    /// 加入对局（观战者也用这个动作）
    pub fn join(game: GameId) -> Self {
        Self::for_game(Action::Join, Some(game))
    }

    /// 查询状态
    pub fn status(game: Option<GameId>) -> Self {
        Self::for_game(Action::Status, game)
    }

    /// 走棋
    pub fn make_move(game: Option<GameId>, mv: UciMove) -> Self {
        Self {
            mv: Some(mv),
            ..Self::for_game(Action::Move, game)
        }
    }

    /// 提和
    pub fn draw_offer(game: Option<GameId>) -> Self {
        Self::for_game(Action::DrawOffer, game)
    }

    /// 响应提和
    pub fn draw_response(game: Option<GameId>, accept: bool) -> Self {
        Self {
            accept: Some(accept),
            ..Self::for_game(Action::DrawResponse, game)
        }
    }

    /// 认输
    pub fn resign(game: Option<GameId>) -> Self {
        Self::for_game(Action::Resign, game)
    }

    /// 停止观战
    pub fn stop_spectating(game: Option<GameId>) -> Self {
        Self::for_game(Action::StopSpectate, game)
    }
}

/// 响应状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameState>,
    /// 心跳响应（任意非空值）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pong: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    /// 是否携带有效的 pong 字段（null / false 不算）
    pub fn has_pong(&self) -> bool {
        matches!(&self.pong, Some(v) if !v.is_null() && v != &serde_json::Value::Bool(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_shape() {
        let msg = ClientMessage::seek();
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"action":"seek"}"#);

        let mv: UciMove = "e7e8q".parse().unwrap();
        let msg = ClientMessage::make_move(Some(GameId::from("g1")), mv);
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"action":"move","game":"g1","move":"e7e8q"}"#
        );

        let msg = ClientMessage::draw_response(Some(GameId::from("g1")), false);
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"action":"drawResponse","game":"g1","accept":false}"#
        );
    }

    #[test]
    fn test_action_names() {
        let names: Vec<String> = [
            Action::Ping,
            Action::DrawOffer,
            Action::StopSpectate,
            Action::Spectate,
        ]
        .iter()
        .map(|a| serde_json::to_string(a).unwrap())
        .collect();
        assert_eq!(
            names,
            vec![r#""ping""#, r#""drawOffer""#, r#""stopSpectating""#, r#""spectate""#]
        );
    }

    #[test]
    fn test_server_message_parse() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"status":"error","error":"Invalid token"}"#).unwrap();
        assert_eq!(msg.status, Status::Error);
        assert_eq!(msg.error.as_deref(), Some("Invalid token"));

        let msg: ServerMessage = serde_json::from_str(r#"{"status":"ok","pong":1}"#).unwrap();
        assert!(msg.has_pong());

        let msg: ServerMessage =
            serde_json::from_str(r#"{"status":"ok","user":{"id":3,"guest":false}}"#).unwrap();
        assert!(!msg.has_pong());
        assert_eq!(msg.user.unwrap().id.as_str(), "3");
    }

    #[test]
    fn test_odd_game_fields_keep_message() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"status":"ok","user":{"id":3},
                "game":{"id":9,"turn":1,"moves":["e2e4","zz99"],"reason":-1}}"#,
        )
        .unwrap();
        assert_eq!(msg.user.unwrap().id.as_str(), "3");
        let game = msg.game.unwrap();
        assert_eq!(game.moves.len(), 2);
        assert_eq!(game.reason, None);
    }
}
