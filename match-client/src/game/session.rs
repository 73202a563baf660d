//! 对局驱动
//!
//! 单线程事件循环：在通道事件、表现层命令、棋钟刷新和心跳之间 select，
//! 每处理完一个事件就把 [`MatchCore`] 的输出发到通道上。

use std::time::Duration;

use protocol::{Connector, UciMove, CLOCK_TICK, CLOSE_WAIT, PING_INTERVAL};
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use super::premove::Premove;
use super::state::{MatchCore, MatchOptions};
use super::{Command, MatchEvent};
use crate::engine::PositionEngine;
use crate::error::{Result, SyncError};
use crate::events::ListenerId;
use crate::network::{ChannelEvent, ChannelTiming, GameChannel};

/// 驱动计时参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub clock_tick: Duration,
    pub ping_interval: Duration,
    /// 离开时等待关闭帧写出的上限
    pub close_wait: Duration,
    pub channel: ChannelTiming,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            clock_tick: CLOCK_TICK,
            ping_interval: PING_INTERVAL,
            close_wait: CLOSE_WAIT,
            channel: ChannelTiming::default(),
        }
    }
}

/// 向运行中的会话发送命令（可克隆，可跨任务）
#[derive(Debug, Clone)]
pub struct MatchHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl MatchHandle {
    /// 发送命令，会话已结束时返回 false
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn submit_move(&self, mv: UciMove) -> bool {
        self.send(Command::SubmitMove(mv))
    }

    pub fn set_premove(&self, premove: Option<Premove>) -> bool {
        self.send(Command::SetPremove(premove))
    }

    pub fn offer_draw(&self) -> bool {
        self.send(Command::OfferDraw)
    }

    pub fn respond_draw(&self, accept: bool) -> bool {
        self.send(Command::RespondDraw(accept))
    }

    pub fn resign(&self) -> bool {
        self.send(Command::Resign)
    }

    pub fn stop_spectating(&self) -> bool {
        self.send(Command::StopSpectating)
    }

    pub fn reconnect(&self) -> bool {
        self.send(Command::Reconnect)
    }

    pub fn show_past(&self, index: usize) -> bool {
        self.send(Command::ShowPast(index))
    }

    pub fn resync(&self) -> bool {
        self.send(Command::Resync)
    }

    pub fn leave(&self) -> bool {
        self.send(Command::Leave)
    }
}

/// 一场对局的会话
pub struct MatchSession<C: Connector, E: PositionEngine> {
    core: MatchCore<E>,
    channel: GameChannel<C>,
    channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    handle: MatchHandle,
    timing: SessionTiming,
}

impl<C: Connector, E: PositionEngine> MatchSession<C, E> {
    pub fn new(
        connector: C,
        url: impl Into<String>,
        engine: E,
        options: MatchOptions,
        timing: SessionTiming,
    ) -> Self {
        let (channel, channel_events) = GameChannel::new(connector, url, timing.channel);
        let (tx, commands) = mpsc::unbounded_channel();
        Self {
            core: MatchCore::new(engine, options),
            channel,
            channel_events,
            commands,
            handle: MatchHandle { commands: tx },
            timing,
        }
    }

    pub fn handle(&self) -> MatchHandle {
        self.handle.clone()
    }

    /// 注册事件处理器（会话拆除时自动注销）
    pub fn subscribe<F>(&mut self, handler: F) -> ListenerId
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        self.core.subscribe(handler)
    }

    pub fn core(&self) -> &MatchCore<E> {
        &self.core
    }

    /// 连接并运行，直到离开或收到致命错误
    ///
    /// 返回前关闭帧已经写出（或等待超时）。
    pub async fn run(mut self) -> Result<()> {
        self.channel.connect();

        let mut clock = interval(self.timing.clock_tick);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ping = interval_at(
            Instant::now() + self.timing.ping_interval,
            self.timing.ping_interval,
        );

        loop {
            tokio::select! {
                Some(event) = self.channel_events.recv() => {
                    self.core.on_channel_event(event, Instant::now());
                }
                Some(command) = self.commands.recv() => {
                    tracing::debug!("Command {:?}", command);
                    if let Err(e) = self.core.handle_command(command) {
                        tracing::debug!("Command rejected: {}", e);
                    }
                }
                now = clock.tick() => self.core.on_clock_tick(now),
                now = ping.tick() => self.core.on_ping_due(now),
            }

            if let Some(result) = self.flush() {
                self.channel.close(self.timing.close_wait).await;
                self.core.shutdown();
                return result;
            }
        }
    }

    /// 发出本轮输出；需要拆除时返回会话结果
    fn flush(&mut self) -> Option<Result<()>> {
        let outbox = self.core.take_outbox();
        for msg in outbox.messages {
            self.channel.send(msg);
        }
        if outbox.reconnect {
            self.channel.connect();
        }
        if !outbox.teardown {
            return None;
        }

        Some(match outbox.fatal {
            Some(message) => Err(SyncError::Server { message }),
            None => Ok(()),
        })
    }
}
