//! 客户端配置
//!
//! 配置数据结构、持久化和环境变量覆盖

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::{
    parse_socket_url, GameId, CLOCK_TICK_MS, CLOSE_WAIT_MS, LOW_TIME_THRESHOLD_MS,
    PING_INTERVAL_SECS, RECONNECT_DELAY_MS, SEND_RETRY_ATTEMPTS, SEND_RETRY_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

use crate::game::{MatchOptions, Role, SessionTiming};
use crate::network::ChannelTiming;

/// 服务器地址环境变量
pub const SOCKET_URL_ENV: &str = "MATCH_SOCKET_URL";

/// 认证令牌环境变量
pub const AUTH_TOKEN_ENV: &str = "MATCH_AUTH_TOKEN";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// tracing 过滤指令中的级别名
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 计时参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 棋钟刷新周期（毫秒）
    pub clock_tick_ms: u64,
    /// 心跳间隔（毫秒）
    pub ping_interval_ms: u64,
    /// 发送重试间隔（毫秒）
    pub send_retry_interval_ms: u64,
    /// 发送重试次数
    pub send_retry_attempts: u32,
    /// 重连延迟（毫秒）
    pub reconnect_delay_ms: u64,
    /// 离开时等待关闭帧写出的上限（毫秒）
    pub close_wait_ms: u64,
    /// 低时间提醒阈值（毫秒）
    pub low_time_threshold_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            clock_tick_ms: CLOCK_TICK_MS,
            ping_interval_ms: PING_INTERVAL_SECS * 1000,
            send_retry_interval_ms: SEND_RETRY_INTERVAL_MS,
            send_retry_attempts: SEND_RETRY_ATTEMPTS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            close_wait_ms: CLOSE_WAIT_MS,
            low_time_threshold_ms: LOW_TIME_THRESHOLD_MS,
        }
    }
}

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    // === 网络设置 ===
    /// 对局服务器地址（ws / wss）
    pub socket_url: String,
    /// 认证令牌
    pub auth_token: Option<String>,

    // === 对局设置 ===
    pub role: Role,
    /// 要加入或观战的对局
    pub target_match: Option<String>,
    pub timing: TimingConfig,

    // === 高级设置 ===
    pub log_level: LogLevel,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://127.0.0.1:8080/ws".to_string(),
            auth_token: None,
            role: Role::Player,
            target_match: None,
            timing: TimingConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl ClientConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("match-client");
            path.push("config.json");
            path
        })
    }

    /// 从默认位置加载，任何问题都退回默认配置
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("无法获取配置目录，使用默认配置");
            return Self::default();
        };

        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!("已加载配置: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("{:#}，使用默认配置", e);
                Self::default()
            }
        }
    }

    /// 从指定文件加载
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式无效 {}", path.display()))?;
        Ok(config)
    }

    /// 保存到默认位置
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("无法获取配置目录")?;
        self.save_to(&path)
    }

    /// 保存到指定文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录 {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        std::fs::write(path, content)
            .with_context(|| format!("写入配置文件失败 {}", path.display()))?;

        tracing::info!("配置已保存: {:?}", path);
        Ok(())
    }

    /// 应用环境变量和命令行参数（第一个参数为目标对局）
    pub fn apply_overrides<I>(&mut self, lookup: impl Fn(&str) -> Option<String>, args: I)
    where
        I: IntoIterator<Item = String>,
    {
        if let Some(url) = lookup(SOCKET_URL_ENV) {
            self.socket_url = url;
        }
        if let Some(token) = lookup(AUTH_TOKEN_ENV) {
            self.auth_token = Some(token);
        }
        if let Some(target) = args.into_iter().next() {
            self.target_match = Some(target);
        }
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<()> {
        parse_socket_url(&self.socket_url)
            .with_context(|| format!("无效的服务器地址 {}", self.socket_url))?;
        let timing = &self.timing;
        if timing.clock_tick_ms == 0 || timing.ping_interval_ms == 0 {
            anyhow::bail!("clock_tick_ms 和 ping_interval_ms 必须大于 0");
        }
        Ok(())
    }

    /// 对局参数
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            role: self.role,
            auth_token: self.auth_token.clone(),
            target_match: self.target_match.as_deref().map(GameId::from),
            low_time_threshold_ms: self.timing.low_time_threshold_ms,
        }
    }

    /// 驱动计时参数
    pub fn session_timing(&self) -> SessionTiming {
        let timing = &self.timing;
        SessionTiming {
            clock_tick: Duration::from_millis(timing.clock_tick_ms),
            ping_interval: Duration::from_millis(timing.ping_interval_ms),
            close_wait: Duration::from_millis(timing.close_wait_ms),
            channel: ChannelTiming {
                send_retry_interval: Duration::from_millis(timing.send_retry_interval_ms),
                send_retry_attempts: timing.send_retry_attempts,
                reconnect_delay: Duration::from_millis(timing.reconnect_delay_ms),
            },
        }
    }
}
