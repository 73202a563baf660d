//! 传输层抽象
//!
//! 提供 Connector/FrameSink/FrameSource traits 使上层同步逻辑与具体传输实现解耦，
//! 便于在测试中替换为内存实现。

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{ProtocolError, Result};
use crate::{ABNORMAL_CLOSE_CODE, CONNECT_TIMEOUT};

/// 收到的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 文本消息（JSON）
    Text(String),
    /// 连接关闭
    Closed { code: u16 },
}

/// 写端
#[async_trait]
pub trait FrameSink: Send {
    /// 发送一条文本消息
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// 发送关闭帧
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// 读端
#[async_trait]
pub trait FrameSource: Send {
    /// 读取下一帧；连接结束后返回 `Frame::Closed`，之后返回 None
    async fn next_frame(&mut self) -> Option<Frame>;
}

/// 连接器 trait（客户端使用）
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Sink: FrameSink + 'static;
    type Source: FrameSource + 'static;

    /// 建立连接，返回分离的读写端
    async fn connect(&self, url: &str) -> Result<(Self::Sink, Self::Source)>;
}

/// 校验服务器地址（只接受 ws / wss）
pub fn parse_socket_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| ProtocolError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ProtocolError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

// ============================================================================
// WebSocket 实现
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket 连接器
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Sink = WsFrameWriter;
    type Source = WsFrameReader;

    async fn connect(&self, url: &str) -> Result<(Self::Sink, Self::Source)> {
        let url = parse_socket_url(url)?;
        let (stream, _response) = timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;

        let (write_half, read_half) = stream.split();
        Ok((
            WsFrameWriter { writer: write_half },
            WsFrameReader {
                reader: read_half,
                finished: false,
            },
        ))
    }
}

/// WebSocket 写端
pub struct WsFrameWriter {
    writer: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsFrameWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.writer.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.writer.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

/// WebSocket 读端
pub struct WsFrameReader {
    reader: SplitStream<WsStream>,
    finished: bool,
}

#[async_trait]
impl FrameSource for WsFrameReader {
    async fn next_frame(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => return Some(Frame::Text(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Frame::Text(text)),
                    Err(e) => tracing::warn!("Dropping non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    self.finished = true;
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(ABNORMAL_CLOSE_CODE);
                    return Some(Frame::Closed { code });
                }
                // ping/pong 由 tungstenite 自动处理
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    self.finished = true;
                    return Some(Frame::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                    });
                }
                None => {
                    self.finished = true;
                    return Some(Frame::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                    });
                }
            }
        }
    }
}
