//! DevTools Transport - Session transport for remote debugging protocols.
//!
//! This library keeps one persistent connection to a browser's remote
//! debugging endpoint and multiplexes message traffic over it.
//!
//! # Architecture
//!
//! Each [`Session`] runs a single cooperative loop that:
//!
//! - Reassembles inbound fragments into whole UTF-8 messages
//! - Dispatches every message to a [`MessageHandler`] without blocking reads
//! - Writes queued payloads in FIFO order, one send at a time
//! - Drains gracefully on a local or remote close
//!
//! Many tasks may share a [`SessionHandle`] to send concurrently. The loop
//! guarantees a single reader and a single writer on the connection.
//!
//! # Quick Start
//!
//! ```no_run
//! use devtools_transport::{BoxError, Result, Session, on_ready};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder().build()?;
//!     let handle = session.handle();
//!
//!     // Send a command once connected
//!     let ready = on_ready({
//!         let handle = handle.clone();
//!         move |_token: CancellationToken| async move {
//!             handle.send(r#"{"id":1,"method":"Browser.getVersion"}"#)?;
//!             Ok::<(), BoxError>(())
//!         }
//!     });
//!
//!     // Print responses and close after the first one
//!     let handler = move |message: String, _token: CancellationToken| {
//!         let handle = handle.clone();
//!         async move {
//!             println!("{message}");
//!             handle.request_close();
//!             Ok::<(), BoxError>(())
//!         }
//!     };
//!
//!     let outcome = session
//!         .connect(
//!             "ws://127.0.0.1:9222/devtools/browser",
//!             handler,
//!             Some(ready),
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!
//!     println!("Session ended: {outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`session`] | [`Session`], handles, handlers and options |
//! | [`transport`] | Transport traits, reassembly, queue and WebSocket |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Session lifecycle and main loop.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Transport layer.
///
/// Connection traits, message reassembly, the outbound queue and the
/// WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{
    HandlerResult, MessageHandler, ReadyCallback, Session, SessionBuilder, SessionHandle,
    SessionOptions, SessionOutcome, SessionState, on_ready,
};

// Transport types
pub use transport::{
    Connector, FrameKind, FrameSink, FrameSource, Fragment, MessageReader, OutboundQueue,
    ReadOutcome, TransportLimits, WebSocketConnector,
};

// Error types
pub use error::{BoxError, Error, Result};

// Identifier types
pub use identifiers::SessionId;
