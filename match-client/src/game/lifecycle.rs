//! 会话状态机
//!
//! 决定在认证、匹配、加入、对局、结束各阶段应该发送什么动作。
//! 状态按等级单调前进，`Exited` 之后不再变化。

use std::fmt;

use protocol::{ClientMessage, GameId, GameState, UserInfo};
use serde::{Deserialize, Serialize};

/// 本地身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Spectator,
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Authenticating,
    Authenticated,
    Seeking,
    Joining,
    Spectating,
    Playing,
    Exited,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Authenticating => 1,
            SessionState::Authenticated => 2,
            SessionState::Seeking | SessionState::Joining | SessionState::Spectating => 3,
            SessionState::Playing => 4,
            SessionState::Exited => 5,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Seeking => "seeking",
            SessionState::Joining => "joining",
            SessionState::Spectating => "spectating",
            SessionState::Playing => "playing",
            SessionState::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// 一次状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// 会话生命周期
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: SessionState,
    role: Role,
    token: Option<String>,
    /// 启动时指定的对局
    target: Option<GameId>,
    /// 第一次收到快照时记下的对局（重连后用它重新加入）
    known_game: Option<GameId>,
    user: Option<UserInfo>,
    transitions: Vec<Transition>,
}

impl Lifecycle {
    pub fn new(role: Role, token: Option<String>, target: Option<GameId>) -> Self {
        Self {
            state: SessionState::Idle,
            role,
            token,
            target,
            known_game: None,
            user: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_spectator(&self) -> bool {
        self.role == Role::Spectator
    }

    pub fn is_exited(&self) -> bool {
        self.state == SessionState::Exited
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// 当前对局 ID（已知对局优先于启动目标）
    pub fn game_id(&self) -> Option<&GameId> {
        self.known_game.as_ref().or(self.target.as_ref())
    }

    /// 向更高等级的状态前进，返回是否发生变化
    fn advance(&mut self, next: SessionState) -> bool {
        if self.state == SessionState::Exited || next.rank() <= self.state.rank() {
            return false;
        }
        tracing::info!("Session {} -> {}", self.state, next);
        self.transitions.push(Transition {
            from: self.state,
            to: next,
        });
        self.state = next;
        true
    }

    /// 连接建立：有令牌的玩家发送认证
    pub fn on_opened(&mut self) -> Option<ClientMessage> {
        if self.is_exited() || self.is_spectator() {
            return None;
        }
        let token = self.token.clone()?;
        self.advance(SessionState::Authenticating);
        Some(ClientMessage::auth(token))
    }

    /// 认证完成：观战者加入目标对局，玩家加入或匹配，游客不做任何事
    pub fn on_authenticated(&mut self, user: UserInfo) -> Option<ClientMessage> {
        let guest = user.guest;
        self.user = Some(user);
        if self.is_exited() {
            return None;
        }
        self.advance(SessionState::Authenticated);

        if self.is_spectator() {
            let game = self.game_id()?.clone();
            self.advance(SessionState::Spectating);
            return Some(ClientMessage::join(game));
        }
        if guest {
            tracing::debug!("Guest user, waiting for an explicit action");
            return None;
        }
        match self.game_id().cloned() {
            Some(game) => {
                self.advance(SessionState::Joining);
                Some(ClientMessage::join(game))
            }
            None => {
                self.advance(SessionState::Seeking);
                Some(ClientMessage::seek())
            }
        }
    }

    /// 收到对局快照
    pub fn on_game(&mut self, game: &GameState) {
        if self.known_game.is_none() {
            self.known_game = Some(game.id.clone());
        }
        if game.result.is_terminal() {
            self.exit();
        } else {
            self.advance(SessionState::Playing);
        }
    }

    /// 进入结束状态，返回是否是第一次
    pub fn exit(&mut self) -> bool {
        self.advance(SessionState::Exited)
    }

    /// 取出累计的状态变化
    pub fn drain_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }
}
