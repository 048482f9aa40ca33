//! WebSocket transport over `tokio-tungstenite`.
//!
//! tungstenite reassembles continuation frames itself, so every text or
//! binary message surfaces as a single final [`Fragment`]. Ping and pong
//! frames are answered by tungstenite and never reach the session.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::socket::{Connector, FrameSink, FrameSource, Fragment, TransportLimits};

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frame type used for outbound payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameKind {
    /// Text frames. Payloads must be valid UTF-8.
    #[default]
    Text,
    /// Binary frames.
    Binary,
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Connects to `ws://` and `wss://` endpoints.
///
/// `wss://` needs one of tokio-tungstenite's TLS features enabled.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    frame_kind: FrameKind,
}

impl WebSocketConnector {
    /// Creates a connector sending text frames.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the frame type used for outbound payloads.
    #[inline]
    #[must_use]
    pub fn with_frame_kind(mut self, frame_kind: FrameKind) -> Self {
        self.frame_kind = frame_kind;
        self
    }

    /// Returns the outbound frame type.
    #[inline]
    #[must_use]
    pub const fn frame_kind(&self) -> FrameKind {
        self.frame_kind
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Source = WebSocketSource;
    type Sink = WebSocketSink;

    async fn connect(
        &self,
        url: &Url,
        limits: TransportLimits,
    ) -> Result<(Self::Source, Self::Sink)> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported scheme for WebSocket transport: {}",
                url.scheme()
            )));
        }

        let config = websocket_config(limits);
        let (stream, response) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(config), false)
                .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(%url, status = %response.status(), "WebSocket connection established");

        let (sink, stream) = stream.split();

        Ok((
            WebSocketSource {
                inner: stream,
                open: true,
            },
            WebSocketSink {
                inner: sink,
                frame_kind: self.frame_kind,
            },
        ))
    }
}

/// Maps transport limits onto tungstenite's configuration.
///
/// tungstenite enforces its own message and frame caps before the session
/// sees any data, so both follow the configured limit, including none.
fn websocket_config(limits: TransportLimits) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_message_size)
}

// ============================================================================
// WebSocketSource
// ============================================================================

/// Read half of a WebSocket connection.
pub struct WebSocketSource {
    inner: SplitStream<WsStream>,
    open: bool,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn receive_fragment(&mut self) -> Result<Fragment> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Fragment::last(Bytes::from(text)));
                }

                Some(Ok(Message::Binary(data))) => {
                    return Ok(Fragment::last(data));
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    self.open = false;
                    return Ok(Fragment::Close);
                }

                // Ping, Pong and raw frames
                Some(Ok(other)) => {
                    trace!(len = other.len(), "Ignoring control frame");
                }

                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("WebSocket stream ended");
                    self.open = false;
                    return Ok(Fragment::Close);
                }

                Some(Err(e)) => {
                    self.open = false;
                    return Err(e.into());
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ============================================================================
// WebSocketSink
// ============================================================================

/// Write half of a WebSocket connection.
pub struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
    frame_kind: FrameKind,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, payload: Bytes) -> Result<()> {
        let message = match self.frame_kind {
            FrameKind::Text => {
                let text = Utf8Bytes::try_from(payload).map_err(|e| {
                    Error::protocol(format!("Outbound text payload is not valid UTF-8: {e}"))
                })?;
                Message::Text(text)
            }
            FrameKind::Binary => Message::binary(payload),
        };

        self.inner.send(message).await?;
        Ok(())
    }

    async fn close_output(&mut self, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_owned().into(),
        };

        self.inner.send(Message::Close(Some(frame))).await?;
        debug!(reason, "Close frame sent");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
