//! Session lifecycle.
//!
//! A [`Session`] is built, handed out as many [`SessionHandle`]s as needed,
//! then consumed by [`Session::connect`], which runs until the connection
//! ends. Handles stay valid throughout: they enqueue outbound payloads,
//! request a close, and observe the [`SessionState`].
//!
//! # States
//!
//! ```text
//! Idle → Connecting → Running → Draining → Closed
//!            └───────────┴──────────┴─────→ Faulted
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::transport::queue::OutboundQueue;
use crate::transport::reader::MessageReader;
use crate::transport::socket::{Connector, TransportLimits};
use crate::transport::websocket::WebSocketConnector;

use super::builder::SessionBuilder;
use super::handler::{MessageHandler, ReadyCallback};
use super::multiplexer::Multiplexer;
use super::options::SessionOptions;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Built, not yet connecting.
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Main loop running.
    Running,
    /// Local or remote close in progress; in-flight work is settling.
    Draining,
    /// Ended without error (closed or cancelled).
    Closed,
    /// Ended with an error.
    Faulted,
}

impl SessionState {
    /// Returns `true` for [`Closed`](Self::Closed) and [`Faulted`](Self::Faulted).
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }
}

// ============================================================================
// SessionOutcome
// ============================================================================

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOutcome {
    /// The owner requested the close.
    ClosedLocally,
    /// The remote end closed the connection.
    ClosedRemotely,
    /// The cancellation token fired.
    Cancelled,
}

// ============================================================================
// Session
// ============================================================================

/// One persistent connection to a remote debugging endpoint.
///
/// # Example
///
/// ```no_run
/// use devtools_transport::{BoxError, Session, SessionOutcome};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> devtools_transport::Result<()> {
/// let session = Session::builder().build()?;
/// let handle = session.handle();
///
/// handle.send(r#"{"id":1,"method":"Browser.getVersion"}"#)?;
///
/// let outcome = session
///     .connect(
///         "ws://127.0.0.1:9222/devtools/browser",
///         |message: String, _token: CancellationToken| async move {
///             println!("{message}");
///             Ok::<(), BoxError>(())
///         },
///         None,
///         CancellationToken::new(),
///     )
///     .await?;
///
/// assert_ne!(outcome, SessionOutcome::Cancelled);
/// # Ok(())
/// # }
/// ```
pub struct Session<C = WebSocketConnector> {
    id: SessionId,
    connector: C,
    options: SessionOptions,
    queue: Arc<OutboundQueue>,
    close_requested: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl Session<WebSocketConnector> {
    /// Creates a builder using the WebSocket transport.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }
}

impl<C: Connector> Session<C> {
    /// Creates a session. Options must already be validated.
    pub(crate) fn new(connector: C, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            id: SessionId::new(),
            connector,
            options,
            queue: Arc::new(OutboundQueue::new()),
            close_requested: CancellationToken::new(),
            state,
        }
    }

    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the session options.
    #[inline]
    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns a handle for sending and closing.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            queue: Arc::clone(&self.queue),
            close_requested: self.close_requested.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Connects to `url` and runs the session until it ends.
    ///
    /// `handler` receives every inbound message. `on_ready`, if given, runs
    /// alongside the loop once the transport is connected. Cancelling
    /// `token` abandons all outstanding work.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `url` cannot be parsed
    /// - [`Error::ConnectionTimeout`] if connecting takes too long
    /// - Any transport fault raised while running
    /// - [`Error::Handler`] if the handler or ready callback fails
    pub async fn connect<H: MessageHandler>(
        self,
        url: &str,
        handler: H,
        on_ready: Option<ReadyCallback>,
        token: CancellationToken,
    ) -> Result<SessionOutcome> {
        let result = self.run(url, handler, on_ready, token).await;

        self.queue.seal();
        let dropped = self.queue.discard();

        match &result {
            Ok(outcome) => {
                self.state.send_replace(SessionState::Closed);
                debug!(session_id = %self.id, ?outcome, dropped, "Session ended");
            }
            Err(e) => {
                self.state.send_replace(SessionState::Faulted);
                warn!(session_id = %self.id, error = %e, dropped, "Session faulted");
            }
        }

        result
    }

    async fn run<H: MessageHandler>(
        &self,
        url: &str,
        handler: H,
        on_ready: Option<ReadyCallback>,
        token: CancellationToken,
    ) -> Result<SessionOutcome> {
        let url = Url::parse(url)?;

        // Fires when the caller cancels or when this session ends.
        let linked = token.child_token();
        let _cancel_on_exit = linked.clone().drop_guard();

        if linked.is_cancelled() {
            return Ok(SessionOutcome::Cancelled);
        }

        self.state.send_replace(SessionState::Connecting);
        debug!(session_id = %self.id, %url, "Connecting");

        let connect_timeout = self.options.connect_timeout();
        let limits = TransportLimits {
            max_message_size: self.options.max_message_size,
        };
        let (source, sink) = tokio::select! {
            biased;
            () = linked.cancelled() => return Ok(SessionOutcome::Cancelled),
            result = timeout(connect_timeout, self.connector.connect(&url, limits)) => {
                result.map_err(|_| Error::connection_timeout(self.options.connect_timeout_ms))??
            }
        };

        info!(session_id = %self.id, %url, "Connected");

        let reader = MessageReader::new(
            source,
            self.options.receive_buffer_size,
            self.options.max_message_size,
        );

        Multiplexer {
            session_id: self.id,
            queue: Arc::clone(&self.queue),
            handler: Arc::new(handler),
            token: linked.clone(),
            close_requested: self.close_requested.clone(),
            state: &self.state,
            close_reason: &self.options.close_reason,
        }
        .run(reader, sink, on_ready)
        .await
    }
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Cloneable handle to a [`Session`].
///
/// Valid before, during and after [`Session::connect`].
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    queue: Arc<OutboundQueue>,
    close_requested: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.id
    }

    /// Enqueues a payload for sending.
    ///
    /// Payloads are written in the order they were enqueued, each as one
    /// message. Payloads enqueued before `connect` are sent once connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the session is closing or ended.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        let len = payload.len();
        self.queue.enqueue(payload)?;
        trace!(session_id = %self.id, len, "Payload enqueued");
        Ok(())
    }

    /// Requests a graceful close without waiting for it.
    pub fn request_close(&self) {
        self.close_requested.cancel();
    }

    /// Requests a graceful close and waits until the session ends.
    ///
    /// Returns the terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` fires first. The close request
    /// stays in effect.
    pub async fn close(&self, token: &CancellationToken) -> Result<SessionState> {
        self.request_close();

        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            state = self.wait_closed() => Ok(state),
        }
    }

    /// Waits until the session reaches a terminal state.
    ///
    /// Returns immediately with the last known state if the session was
    /// dropped without running.
    pub async fn wait_closed(&self) -> SessionState {
        let mut state = self.state.clone();
        let result = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        result.unwrap_or_else(|_| *state.borrow())
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns the number of payloads waiting to be sent.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use crate::error::BoxError;
    use crate::transport::testing::{StalledConnector, scripted};

    fn ignore() -> impl MessageHandler {
        |_message: String, _token: CancellationToken| async move { Ok::<(), BoxError>(()) }
    }

    #[test]
    fn test_state_terminal() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Faulted.is_terminal());
        assert!(!SessionState::Draining.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::builder().build().expect("build");
        let handle = session.handle();
        assert_eq!(handle.state(), SessionState::Idle);
        assert_eq!(handle.session_id(), session.id());
        assert_eq!(handle.pending_count(), 0);
    }

    #[test]
    fn test_send_before_connect_is_queued() {
        let session = Session::builder().build().expect("build");
        let handle = session.handle();
        handle.send("queued").expect("enqueue");
        assert_eq!(handle.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let session = Session::builder().build().expect("build");
        let handle = session.handle();

        let err = session
            .connect("not a url", ignore(), None, CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, Error::InvalidUrl(_)));
        assert_eq!(handle.state(), SessionState::Faulted);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let session = Session::builder()
            .connector(StalledConnector)
            .connect_timeout(Duration::from_millis(20))
            .build()
            .expect("build");

        let err = session
            .connect("ws://127.0.0.1:1", ignore(), None, CancellationToken::new())
            .await
            .expect_err("should time out");

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let session = Session::builder()
            .connector(StalledConnector)
            .build()
            .expect("build");
        let handle = session.handle();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = session
            .connect("ws://127.0.0.1:1", ignore(), None, token)
            .await
            .expect("session");

        assert_eq!(outcome, SessionOutcome::Cancelled);
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(matches!(handle.send("late"), Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_cancelled_while_connecting() {
        let session = Session::builder()
            .connector(StalledConnector)
            .build()
            .expect("build");
        let handle = session.handle();
        let token = CancellationToken::new();

        let task = tokio::spawn(session.connect("ws://127.0.0.1:1", ignore(), None, token.clone()));

        let mut state = handle.state.clone();
        state
            .wait_for(|s| *s == SessionState::Connecting)
            .await
            .expect("connecting");
        token.cancel();

        let outcome = task.await.expect("join").expect("session");
        assert_eq!(outcome, SessionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_close_requested_before_connect() {
        let (connector, remote) = scripted();
        let session = Session::builder()
            .connector(connector)
            .close_reason("shutdown")
            .build()
            .expect("build");
        let handle = session.handle();
        handle.send("flush me").expect("enqueue");
        handle.request_close();

        let outcome = session
            .connect("ws://127.0.0.1:1", ignore(), None, CancellationToken::new())
            .await
            .expect("session");

        assert_eq!(outcome, SessionOutcome::ClosedLocally);
        assert_eq!(remote.wire().texts(), vec!["flush me"]);
        assert_eq!(remote.wire().close_reasons(), vec!["shutdown".to_owned()]);
        assert_eq!(handle.wait_closed().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_gives_up_when_token_fires() {
        let session = Session::builder().build().expect("build");
        let handle = session.handle();
        let token = CancellationToken::new();
        token.cancel();

        let result = handle.close(&token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        drop(session);
    }

    #[tokio::test]
    async fn test_wait_closed_after_drop() {
        let session = Session::builder().build().expect("build");
        let handle = session.handle();
        drop(session);

        assert_eq!(handle.wait_closed().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_websocket_session_end_to_end() {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("upgrade");

            let command = ws.next().await.expect("command").expect("command ok");
            assert_eq!(
                command,
                Message::text(r#"{"id":1,"method":"Browser.getVersion"}"#.to_owned())
            );

            ws.send(Message::text(r#"{"id":1,"result":{}}"#.to_owned()))
                .await
                .expect("server send");

            let ack = ws.next().await.expect("ack").expect("ack ok");
            assert_eq!(ack, Message::text("ack:1".to_owned()));

            ws.close(None).await.expect("server close");
        });

        let session = Session::builder().build().expect("build");
        let handle = session.handle();
        let reply = handle.clone();

        let ready = crate::session::handler::on_ready({
            let handle = handle.clone();
            move |_token: CancellationToken| async move {
                handle.send(r#"{"id":1,"method":"Browser.getVersion"}"#)?;
                Ok::<(), BoxError>(())
            }
        });
        let handler = move |message: String, _token: CancellationToken| {
            let reply = reply.clone();
            async move {
                assert!(message.contains("\"result\""));
                reply.send("ack:1")?;
                Ok::<(), BoxError>(())
            }
        };

        let outcome = session
            .connect(
                &format!("ws://127.0.0.1:{port}"),
                handler,
                Some(ready),
                CancellationToken::new(),
            )
            .await
            .expect("session");

        assert_eq!(outcome, SessionOutcome::ClosedRemotely);
        assert_eq!(handle.state(), SessionState::Closed);
        server.await.expect("server task");
    }
}
