//! 对局快照定义（服务端推送的权威状态）

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::piece::Side;

/// 服务端标识（对局 ID / 玩家 ID）
///
/// 服务端可能发送数字或字符串，统一保存为字符串
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct EntityId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl From<RawId> for EntityId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        }
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 对局 ID
pub type GameId = EntityId;

/// 玩家 ID
pub type PlayerId = EntityId;

/// 对局结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GameResult {
    /// 进行中
    #[default]
    #[serde(rename = "*")]
    Ongoing,
    /// 和棋
    #[serde(rename = "1/2-1/2")]
    Draw,
    /// 白方胜
    #[serde(rename = "1-0")]
    WhiteWin,
    /// 黑方胜
    #[serde(rename = "0-1")]
    BlackWin,
}

impl GameResult {
    /// 是否已终局
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameResult::Ongoing)
    }

    /// 胜方（和棋或进行中返回 None）
    pub fn winner(&self) -> Option<Side> {
        match self {
            GameResult::WhiteWin => Some(Side::White),
            GameResult::BlackWin => Some(Side::Black),
            GameResult::Ongoing | GameResult::Draw => None,
        }
    }
}

/// 终局原因（线上为整数枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EndReason {
    Checkmate,
    Timeout,
    Resignation,
    Stalemate,
    Threefold,
    Insufficient,
    FiftyMove,
    Agreement,
}

impl EndReason {
    /// 用于结束提示的描述
    pub fn describe(&self) -> &'static str {
        match self {
            EndReason::Checkmate => "checkmate",
            EndReason::Timeout => "timeout",
            EndReason::Resignation => "resignation",
            EndReason::Stalemate => "stalemate",
            EndReason::Threefold => "threefold",
            EndReason::Insufficient => "insufficient",
            EndReason::FiftyMove => "fifty move",
            EndReason::Agreement => "agreement",
        }
    }
}

impl TryFrom<u8> for EndReason {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => EndReason::Checkmate,
            1 => EndReason::Timeout,
            2 => EndReason::Resignation,
            3 => EndReason::Stalemate,
            4 => EndReason::Threefold,
            5 => EndReason::Insufficient,
            6 => EndReason::FiftyMove,
            7 => EndReason::Agreement,
            other => return Err(ProtocolError::InvalidEndReason(other)),
        })
    }
}

impl From<EndReason> for u8 {
    fn from(reason: EndReason) -> u8 {
        reason as u8
    }
}

/// 玩家信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
}

/// 已认证的用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: PlayerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// 游客账号（游客不会自动匹配或加入）
    #[serde(default)]
    pub guest: bool,
}

/// 单方时钟
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    /// 剩余时间（毫秒）
    #[serde(rename = "time", alias = "time_ms", deserialize_with = "deserialize_millis")]
    pub time_ms: u64,
    /// 是否在走
    #[serde(default)]
    pub active: bool,
}

/// 毫秒数可能带小数，负数按 0 处理
fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    })
}

/// 终局原因：未知编号按缺省处理，不影响整条消息
fn deserialize_reason<'de, D>(deserializer: D) -> Result<Option<EndReason>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_u64())
        .and_then(|n| u8::try_from(n).ok())
        .and_then(|n| EndReason::try_from(n).ok()))
}

/// 对局设置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    /// 自定义起始局面
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_pos: Option<String>,
}

/// 服务端对局快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub id: GameId,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
    /// 当前走子方
    pub turn: Side,
    /// [白方, 黑方]
    #[serde(default)]
    pub clocks: Vec<ClockState>,
    /// 权威走法列表（只追加）
    ///
    /// 保留原始字符串，由对齐器逐步解析，坏的一步只影响它自己
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(default)]
    pub result: GameResult,
    #[serde(
        default,
        deserialize_with = "deserialize_reason",
        skip_serializing_if = "Option::is_none"
    )]
    pub reason: Option<EndReason>,
    /// 提和方
    #[serde(default)]
    pub draw_offer: Option<Side>,
    /// 合法走法（原样透传给界面）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_moves: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<GameSettings>,
    /// 当前局面（尚无走法时用于初始化棋盘）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fen: Option<String>,
    /// 视频房间描述（不解析，原样透传）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting: Option<serde_json::Value>,
    /// 所属赛事（不解析，原样透传）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<serde_json::Value>,
}

impl GameState {
    /// 自定义起始局面
    pub fn start_position(&self) -> Option<&str> {
        self.settings.as_ref().and_then(|s| s.start_pos.as_deref())
    }

    /// 指定一方的时钟
    pub fn clock(&self, side: Side) -> Option<ClockState> {
        self.clocks.get(side.index()).copied()
    }

    /// 指定一方的玩家
    pub fn player(&self, side: Side) -> Option<&PlayerInfo> {
        self.players.get(side.index())
    }

    /// 玩家所属阵营
    pub fn side_of(&self, player: &PlayerId) -> Option<Side> {
        self.players
            .iter()
            .position(|p| &p.id == player)
            .and_then(|i| Side::try_from(i as u8).ok())
    }
}
