//! WebSocket client transport.
//!
//! This module connects to the event bus using tokio-tungstenite and performs
//! the handshake/welcome exchange before handing the session out.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use linkup_protocol::{codec, Frame};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};

use crate::traits::{Connection, ConnectionId, Connector, Credential, TransportError};

/// WebSocket connector configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint URL, `ws://` or `wss://`.
    pub url: String,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// Upper bound for socket connect plus handshake/welcome.
    pub handshake_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            max_message_size: 64 * 1024, // 64 KB
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens WebSocket sessions against one endpoint.
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Connector for `url` with default limits.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WebSocketConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    async fn open(&self, credential: &Credential) -> Result<WebSocketConnection, TransportError> {
        let (stream, _response) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| TransportError::Other(format!("WebSocket connect failed: {}", e)))?;

        debug!(url = %self.config.url, "WebSocket handshake completed");

        let mut conn = WebSocketConnection::new(stream, self.config.max_message_size);
        conn.send(Frame::handshake(credential.expose())).await?;

        match conn.recv().await? {
            Some(Frame::Welcome {
                socket_id,
                heartbeat,
            }) => {
                debug!(socket = %socket_id, heartbeat, "Session welcomed");
                conn.id = ConnectionId::new(socket_id);
                Ok(conn)
            }
            Some(Frame::Error { code, message, .. }) => {
                warn!(credential = %credential, code, "Handshake rejected");
                Err(TransportError::Rejected { code, message })
            }
            Some(other) => Err(TransportError::Other(format!(
                "Expected welcome, got {:?}",
                other.frame_type()
            ))),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Connection>, TransportError> {
        let conn = tokio::time::timeout(self.config.handshake_timeout, self.open(credential))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket session.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    is_open: bool,
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, max_message_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            is_open: true,
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            warn!(
                "Message too large: {} bytes (max: {})",
                len, self.max_message_size
            );
            return Err(TransportError::Protocol(
                linkup_protocol::ProtocolError::FrameTooLarge(len),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
            return Ok(Some(frame));
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    self.read_buffer.extend_from_slice(&data);

                    if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(codec::decode_text(&text)?));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(socket = %self.id, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!(socket = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(socket = %self.id, "WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let data = codec::encode(&frame)?;
        self.stream
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
