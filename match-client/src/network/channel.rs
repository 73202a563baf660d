//! 对局通道
//!
//! 包装一条 WebSocket 连接：连接状态、发送重试、关闭后的自动重连。
//! 读写在后台任务中进行，入站消息经 [`route`] 转成 [`ChannelEvent`] 投递给事件接收端。

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use protocol::{
    ClientMessage, Connector, Frame, FrameSink, FrameSource, ServerMessage, ABNORMAL_CLOSE_CODE,
    NORMAL_CLOSE_CODE, NORMAL_CLOSE_REASON, RECONNECT_DELAY, SEND_RETRY_ATTEMPTS,
    SEND_RETRY_INTERVAL,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::router::{route, ChannelEvent};

/// 通道计时参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTiming {
    /// 未连接时重试发送的间隔
    pub send_retry_interval: Duration,
    /// 首次发送失败后的最大重试次数
    pub send_retry_attempts: u32,
    /// 异常关闭后到重连的延迟
    pub reconnect_delay: Duration,
}

impl Default for ChannelTiming {
    fn default() -> Self {
        Self {
            send_retry_interval: SEND_RETRY_INTERVAL,
            send_retry_attempts: SEND_RETRY_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// 连接状态
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

/// 写任务的输入
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Default)]
struct LinkState {
    status: LinkStatus,
    writer: Option<mpsc::UnboundedSender<Outbound>>,
    /// 已显式断开，不再重连也不再重试发送
    closing: bool,
    io_task: Option<JoinHandle<()>>,
    retries: Vec<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct ChannelInner<C> {
    connector: C,
    url: String,
    timing: ChannelTiming,
    events: mpsc::UnboundedSender<ChannelEvent>,
    link: StdMutex<LinkState>,
}

/// 对局通道（可克隆，克隆体共享同一连接）
pub struct GameChannel<C: Connector> {
    inner: Arc<ChannelInner<C>>,
}

impl<C: Connector> Clone for GameChannel<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> GameChannel<C> {
    /// 创建通道，返回通道本身和事件接收端
    pub fn new(
        connector: C,
        url: impl Into<String>,
        timing: ChannelTiming,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let channel = Self {
            inner: Arc::new(ChannelInner {
                connector,
                url: url.into(),
                timing,
                events,
                link: StdMutex::new(LinkState::default()),
            }),
        };
        (channel, rx)
    }

    fn link(&self) -> MutexGuard<'_, LinkState> {
        // 锁内不会 panic，中毒时直接取回数据
        self.inner
            .link
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ChannelEvent) {
        if self.inner.events.send(event).is_err() {
            tracing::debug!("Channel event receiver dropped");
        }
    }

    /// 当前连接状态
    pub fn status(&self) -> LinkStatus {
        self.link().status
    }

    pub fn is_open(&self) -> bool {
        self.status() == LinkStatus::Open
    }

    /// 建立连接（已有连接或正在连接时不做任何事）
    pub fn connect(&self) {
        let mut link = self.link();
        if matches!(link.status, LinkStatus::Connecting | LinkStatus::Open) {
            tracing::debug!("Connect ignored: link is {:?}", link.status);
            return;
        }
        if let Some(pending) = link.reconnect.take() {
            pending.abort();
        }
        link.closing = false;
        link.status = LinkStatus::Connecting;

        tracing::info!("Connecting to {}", self.inner.url);
        let channel = self.clone();
        link.io_task = Some(tokio::spawn(async move { channel.run_link().await }));
    }

    async fn run_link(self) {
        let (sink, source) = match self.inner.connector.connect(&self.inner.url).await {
            Ok(halves) => halves,
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", self.inner.url, e);
                self.on_closed(ABNORMAL_CLOSE_CODE);
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut link = self.link();
            link.status = LinkStatus::Open;
            link.writer = Some(tx);
        }
        tracing::info!("Connected to {}", self.inner.url);
        self.emit(ChannelEvent::Opened);

        let code = self.pump(sink, source, rx).await;
        self.on_closed(code);
    }

    /// 读写循环，返回关闭码
    async fn pump(
        &self,
        mut sink: C::Sink,
        mut source: C::Source,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ) -> u16 {
        loop {
            tokio::select! {
                out = outbound.recv() => match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send_text(text).await {
                            tracing::warn!("Send failed: {}", e);
                            return ABNORMAL_CLOSE_CODE;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        if let Err(e) = sink.close(code, &reason).await {
                            tracing::debug!("Close frame not delivered: {}", e);
                        }
                        return code;
                    }
                    None => return ABNORMAL_CLOSE_CODE,
                },
                frame = source.next_frame() => match frame {
                    Some(Frame::Text(text)) => self.dispatch(&text),
                    Some(Frame::Closed { code }) => return code,
                    None => return ABNORMAL_CLOSE_CODE,
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(msg) => {
                for event in route(msg) {
                    tracing::debug!("Routed {:?}", event_name(&event));
                    self.emit(event);
                }
            }
            Err(e) => tracing::warn!("Dropping unparsable message: {}", e),
        }
    }

    fn on_closed(&self, code: u16) {
        let mut link = self.link();
        link.status = LinkStatus::Closed;
        link.writer = None;
        link.io_task = None;
        self.emit(ChannelEvent::Closed { code });
        if code == NORMAL_CLOSE_CODE || link.closing || link.reconnect.is_some() {
            tracing::info!("Connection closed with code {}", code);
            return;
        }

        let delay = self.inner.timing.reconnect_delay;
        tracing::warn!(
            "Connection closed abnormally ({}), reconnecting in {:?}",
            code,
            delay
        );
        // 句柄在同一把锁内写入，任务要等锁释放后才能清除它
        let channel = self.clone();
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            channel.link().reconnect = None;
            channel.connect();
        }));
    }

    /// 发送消息（不阻塞调用方）
    ///
    /// 未连接时每隔 `send_retry_interval` 重试，最多 `send_retry_attempts` 次，之后静默丢弃。
    pub fn send(&self, msg: ClientMessage) {
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Cannot serialize {:?}: {}", msg.action, e);
                return;
            }
        };

        let mut link = self.link();
        if link.closing {
            tracing::debug!("Channel closed, dropping {:?}", msg.action);
            return;
        }
        let text = match Self::write(&link, text) {
            Ok(()) => return,
            Err(text) => text,
        };

        let ChannelTiming {
            send_retry_interval,
            send_retry_attempts,
            ..
        } = self.inner.timing;
        let action = msg.action;
        let channel = self.clone();
        let handle = tokio::spawn(async move {
            let mut text = text;
            for _ in 0..send_retry_attempts {
                tokio::time::sleep(send_retry_interval).await;
                let link = channel.link();
                if link.closing {
                    return;
                }
                match Self::write(&link, text) {
                    Ok(()) => return,
                    Err(back) => text = back,
                }
            }
            tracing::debug!(
                "Dropping {:?} after {} retries",
                action,
                send_retry_attempts
            );
        });

        link.retries.retain(|h| !h.is_finished());
        link.retries.push(handle);
    }

    /// 连接打开时写入，否则原样交还
    fn write(link: &LinkState, text: String) -> Result<(), String> {
        match (link.status, &link.writer) {
            (LinkStatus::Open, Some(writer)) if !writer.is_closed() => {
                if writer.send(Outbound::Text(text)).is_err() {
                    tracing::debug!("Writer closed while sending");
                }
                Ok(())
            }
            _ => Err(text),
        }
    }

    /// 显式断开：发送 1000 关闭帧，取消所有重试和待执行的重连
    pub fn disconnect(&self) {
        let mut link = self.link();
        link.closing = true;
        for retry in link.retries.drain(..) {
            retry.abort();
        }
        if let Some(pending) = link.reconnect.take() {
            pending.abort();
        }

        match link.status {
            LinkStatus::Open => {
                if let Some(writer) = &link.writer {
                    let close = Outbound::Close {
                        code: NORMAL_CLOSE_CODE,
                        reason: NORMAL_CLOSE_REASON.to_string(),
                    };
                    if writer.send(close).is_err() {
                        tracing::debug!("Writer already gone");
                    }
                }
            }
            LinkStatus::Connecting => {
                if let Some(task) = link.io_task.take() {
                    task.abort();
                }
                link.status = LinkStatus::Closed;
            }
            LinkStatus::Idle | LinkStatus::Closed => {}
        }
        tracing::info!("Disconnecting from {}", self.inner.url);
    }

    /// 断开并等待后台任务把关闭帧写出，最多等待 `wait`
    pub async fn close(&self, wait: Duration) {
        self.disconnect();
        let task = self.link().io_task.take();
        let Some(mut task) = task else {
            return;
        };
        if tokio::time::timeout(wait, &mut task).await.is_err() {
            tracing::debug!("Close frame not flushed within {:?}", wait);
            task.abort();
        }
    }
}

fn event_name(event: &ChannelEvent) -> &'static str {
    match event {
        ChannelEvent::Opened => "opened",
        ChannelEvent::Authenticated(_) => "authenticated",
        ChannelEvent::GameResponse(_) => "game",
        ChannelEvent::DrawOffered { .. } => "draw offer",
        ChannelEvent::GameExited(_) => "exit",
        ChannelEvent::Pong => "pong",
        ChannelEvent::Error(_) => "error",
        ChannelEvent::Closed { .. } => "closed",
    }
}
