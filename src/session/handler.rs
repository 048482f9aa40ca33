//! Inbound message callbacks.
//!
//! Any `Fn(String, CancellationToken) -> impl Future<Output = HandlerResult>`
//! closure is a [`MessageHandler`]:
//!
//! ```ignore
//! let handler = |message: String, _token: CancellationToken| async move {
//!     println!("received {message}");
//!     Ok::<(), BoxError>(())
//! };
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

// ============================================================================
// Types
// ============================================================================

/// Result returned by message handlers and ready callbacks.
pub type HandlerResult = Result<(), BoxError>;

/// Callback run once the transport is connected, alongside the main loop.
///
/// It may send and wait for replies: the loop is already running.
pub type ReadyCallback = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, HandlerResult> + Send>;

// ============================================================================
// MessageHandler
// ============================================================================

/// Receives every complete inbound message, in arrival order.
///
/// Handlers may still be running when the next message is delivered. A
/// handler error terminates the session with [`Error::Handler`](crate::Error::Handler).
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one message. `token` fires when the session is cancelled.
    async fn on_message(&self, message: String, token: CancellationToken) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn on_message(&self, message: String, token: CancellationToken) -> HandlerResult {
        (self)(message, token).await
    }
}

/// Boxes an async closure into a [`ReadyCallback`].
pub fn on_ready<F, Fut>(callback: F) -> ReadyCallback
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |token| callback(token).boxed())
}

// ============================================================================
// Tests
// ============================================================================
