//! 测试用的内存连接器

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use protocol::{Connector, Frame, FrameSink, FrameSource, ProtocolError, Result as ProtocolResult};
use tokio::sync::mpsc;

/// 客户端写出的内容
#[derive(Debug, PartialEq)]
pub enum Sent {
    Text(String),
    Close(u16, String),
}

/// 测试侧持有的连接另一端
pub struct MockLink {
    pub to_client: mpsc::UnboundedSender<Frame>,
    pub from_client: mpsc::UnboundedReceiver<Sent>,
}

pub struct MockSink(mpsc::UnboundedSender<Sent>);

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> ProtocolResult<()> {
        self.0
            .send(Sent::Text(text))
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> ProtocolResult<()> {
        self.0
            .send(Sent::Close(code, reason.to_string()))
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

pub struct MockSource(mpsc::UnboundedReceiver<Frame>);

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Option<Frame> {
        self.0.recv().await
    }
}

/// 内存连接器，记录连接次数并把每条新连接交给测试
pub struct MockConnector {
    pub attempts: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    links: mpsc::UnboundedSender<MockLink>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockLink>) {
        let (links, rx) = mpsc::unbounded_channel();
        (
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                fail: Arc::new(AtomicBool::new(false)),
                links,
            },
            rx,
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Sink = MockSink;
    type Source = MockSource;

    async fn connect(&self, _url: &str) -> ProtocolResult<(MockSink, MockSource)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConnectionTimeout);
        }
        let (to_client, source) = mpsc::unbounded_channel();
        let (sink, from_client) = mpsc::unbounded_channel();
        let _ = self.links.send(MockLink {
            to_client,
            from_client,
        });
        Ok((MockSink(sink), MockSource(source)))
    }
}
