//! 协议常量定义

use std::time::Duration;

/// 标准初始局面（FEN）
pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// 正常关闭码（主动离开，不重连）
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// 异常关闭码（连接中断且没有关闭帧）
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// 主动断开时附带的关闭原因
pub const NORMAL_CLOSE_REASON: &str = "Game Finished!";

/// 本地时钟刷新周期（毫秒）
pub const CLOCK_TICK_MS: u64 = 100;

/// 心跳（ping）间隔（秒）
pub const PING_INTERVAL_SECS: u64 = 10;

/// 发送重试间隔（毫秒）
pub const SEND_RETRY_INTERVAL_MS: u64 = 1000;

/// 发送最大重试次数，超过后静默丢弃
pub const SEND_RETRY_ATTEMPTS: u32 = 3;

/// 异常断线后的重连延迟（毫秒）
pub const RECONNECT_DELAY_MS: u64 = 1000;

/// 低时间提醒阈值（毫秒）- 60 秒
pub const LOW_TIME_THRESHOLD_MS: u64 = 60 * 1000;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 主动断开时等待关闭帧写出的上限（毫秒）
pub const CLOSE_WAIT_MS: u64 = 1000;

/// 走法字符串里表示"不升变"的占位字符
pub const NO_PROMOTION_SENTINEL: char = 'x';

/// 时钟刷新 Duration
pub const CLOCK_TICK: Duration = Duration::from_millis(CLOCK_TICK_MS);

/// 心跳间隔 Duration
pub const PING_INTERVAL: Duration = Duration::from_secs(PING_INTERVAL_SECS);

/// 发送重试间隔 Duration
pub const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(SEND_RETRY_INTERVAL_MS);

/// 重连延迟 Duration
pub const RECONNECT_DELAY: Duration = Duration::from_millis(RECONNECT_DELAY_MS);

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

/// 关闭帧等待 Duration
pub const CLOSE_WAIT: Duration = Duration::from_millis(CLOSE_WAIT_MS);
