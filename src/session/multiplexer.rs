//! Session main loop.
//!
//! One cooperative loop per session waits on a fixed set of named slots and
//! handles whichever completes first:
//!
//! | Slot | Completes when |
//! |------|----------------|
//! | cancellation | caller or internal token fires |
//! | dispatch | a message handler or the ready callback finishes |
//! | read | a whole message or a remote close arrived |
//! | write | the in-flight send finished |
//! | write-notify | the outbound queue went from empty to non-empty |
//! | close | the owner requested a local close |
//!
//! The read and write slots hold at most one operation each. A completed
//! operation clears its slot, and the slot is re-armed at most once per
//! completion. Handler dispatches live in a `FuturesUnordered` set and are
//! removed as they finish.
//!
//! # Shutdown
//!
//! - Local close: reading and dispatching continue until running handlers
//!   finish, so a handler waiting for a reply still gets it. Then the queue
//!   is sealed, queued payloads (including handler replies) are flushed and
//!   the close frame is sent.
//! - Remote close: unsent payloads are discarded and later sends are dropped
//!   without error; the in-flight send and running handlers settle. A message
//!   received before the close frame is always dispatched, and its handler
//!   finishes, before the session reports [`SessionOutcome::ClosedRemotely`].
//!   A remote close during a local drain skips the close frame but still
//!   reports [`SessionOutcome::ClosedLocally`].
//! - Cancellation: everything outstanding is dropped on the spot.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::transport::queue::{OutboundQueue, WriteOp, Writer};
use crate::transport::reader::{MessageReader, ReadOp, ReadOutcome};
use crate::transport::socket::{FrameSink, FrameSource};

use super::core::{SessionOutcome, SessionState};
use super::handler::{HandlerResult, MessageHandler, ReadyCallback};

// ============================================================================
// Types
// ============================================================================

/// A running handler invocation.
type Dispatch = BoxFuture<'static, HandlerResult>;

/// What woke the loop.
enum Event<S, W> {
    Cancelled,
    Dispatched(HandlerResult),
    Read(MessageReader<S>, Result<ReadOutcome>),
    Written(W, Result<()>),
    WriteReady,
    CloseRequested,
}

/// Why the session is draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Local,
    Remote,
}

// ============================================================================
// Multiplexer
// ============================================================================

/// Drives one connected session until it closes, is cancelled or faults.
pub(crate) struct Multiplexer<'a, H> {
    pub(crate) session_id: SessionId,
    pub(crate) queue: Arc<OutboundQueue>,
    pub(crate) handler: Arc<H>,
    /// Linked token: caller's token plus internal cancellation.
    pub(crate) token: CancellationToken,
    pub(crate) close_requested: CancellationToken,
    pub(crate) state: &'a watch::Sender<SessionState>,
    pub(crate) close_reason: &'a str,
}

impl<H: MessageHandler> Multiplexer<'_, H> {
    /// Runs the loop.
    ///
    /// # Errors
    ///
    /// Returns the first transport or handler fault.
    pub(crate) async fn run<S, W>(
        self,
        reader: MessageReader<S>,
        sink: W,
        on_ready: Option<ReadyCallback>,
    ) -> Result<SessionOutcome>
    where
        S: FrameSource,
        W: FrameSink,
    {
        let session_id = self.session_id;

        let mut writer = Writer::new(Arc::clone(&self.queue), sink);
        let mut read_slot: Option<ReadOp<S>> = Some(reader.into_read_op());
        let mut write_slot: Option<WriteOp<W>> = None;
        let mut dispatch: FuturesUnordered<Dispatch> = FuturesUnordered::new();
        let mut drain: Option<Drain> = None;
        let mut closed_locally = false;

        if let Some(callback) = on_ready {
            dispatch.push(callback(self.token.clone()));
        }

        self.state.send_replace(SessionState::Running);
        info!(%session_id, "Session running");

        // Payloads enqueued before the loop started.
        self.pump(&mut writer, &mut write_slot);

        loop {
            let event = tokio::select! {
                biased;

                () = self.token.cancelled() => Event::Cancelled,

                Some(result) = dispatch.next(), if !dispatch.is_empty() => {
                    Event::Dispatched(result)
                }

                (reader, result) = settle(&mut read_slot) => Event::Read(reader, result),

                (sink, result) = settle(&mut write_slot) => Event::Written(sink, result),

                () = self.queue.notified(), if drain != Some(Drain::Remote) => Event::WriteReady,

                () = self.close_requested.cancelled(), if drain.is_none() => {
                    Event::CloseRequested
                }
            };

            match event {
                Event::Cancelled => {
                    self.queue.seal();
                    let dropped = self.queue.discard();
                    debug!(
                        %session_id,
                        dropped,
                        handlers = dispatch.len(),
                        "Session cancelled"
                    );
                    return Ok(SessionOutcome::Cancelled);
                }

                Event::Dispatched(Ok(())) => {}

                Event::Dispatched(Err(e)) => {
                    error!(%session_id, error = %e, "Message handler failed");
                    return Err(Error::handler(e));
                }

                Event::Read(reader, Ok(ReadOutcome::Message(text))) => {
                    trace!(%session_id, len = text.len(), "Dispatching message");
                    dispatch.push(self.dispatch(text));
                    // Next read starts without waiting for the handler.
                    read_slot = Some(reader.into_read_op());
                }

                Event::Read(_, Ok(ReadOutcome::RemoteClosed)) => {
                    self.queue.discard_incoming();
                    let dropped = self.queue.discard();
                    if dropped > 0 {
                        warn!(%session_id, dropped, "Discarding unsent messages");
                    }
                    debug!(%session_id, "Remote closed, draining");
                    drain = Some(Drain::Remote);
                    self.state.send_replace(SessionState::Draining);
                }

                Event::Read(_, Err(e)) => {
                    error!(%session_id, error = %e, "Receive failed");
                    return Err(e);
                }

                Event::Written(sink, Ok(())) => {
                    writer.complete(sink);
                    if drain != Some(Drain::Remote) {
                        self.pump(&mut writer, &mut write_slot);
                    }
                }

                Event::Written(_, Err(e)) => {
                    error!(%session_id, error = %e, "Send failed");
                    return Err(e);
                }

                Event::WriteReady => {
                    self.pump(&mut writer, &mut write_slot);
                }

                Event::CloseRequested => {
                    debug!(
                        %session_id,
                        handlers = dispatch.len(),
                        "Local close requested, draining"
                    );
                    // Reads stay armed: running handlers may await replies.
                    closed_locally = true;
                    drain = Some(Drain::Local);
                    self.state.send_replace(SessionState::Draining);
                }
            }

            match drain {
                Some(Drain::Local) if dispatch.is_empty() => {
                    // No handler left to reply: stop reading and accepting,
                    // flush the rest.
                    read_slot = None;
                    self.queue.seal();
                    self.pump(&mut writer, &mut write_slot);
                    if write_slot.is_none() {
                        return self.close_output(&mut writer).await;
                    }
                }

                Some(Drain::Remote) if dispatch.is_empty() && write_slot.is_none() => {
                    if closed_locally {
                        info!(%session_id, "Session closed locally, remote closed first");
                        return Ok(SessionOutcome::ClosedLocally);
                    }
                    info!(%session_id, "Session closed by remote");
                    return Ok(SessionOutcome::ClosedRemotely);
                }

                _ => {}
            }
        }
    }

    /// Starts the next write if the sink is idle and the session is not cancelled.
    fn pump<W: FrameSink>(&self, writer: &mut Writer<W>, write_slot: &mut Option<WriteOp<W>>) {
        if !writer.is_busy() && !self.token.is_cancelled() {
            *write_slot = writer.pump();
        }
    }

    /// Invokes the handler for one message.
    fn dispatch(&self, message: String) -> Dispatch {
        let handler = Arc::clone(&self.handler);
        let token = self.token.clone();
        async move { handler.on_message(message, token).await }.boxed()
    }

    /// Sends the close frame, unless cancellation wins the race.
    async fn close_output<W: FrameSink>(&self, writer: &mut Writer<W>) -> Result<SessionOutcome> {
        if let Some(mut sink) = writer.take_sink() {
            tokio::select! {
                biased;
                () = self.token.cancelled() => return Ok(SessionOutcome::Cancelled),
                result = sink.close_output(self.close_reason) => result?,
            }
        }

        info!(session_id = %self.session_id, "Session closed locally");
        Ok(SessionOutcome::ClosedLocally)
    }
}

/// Waits for the operation in `slot` and clears the slot.
///
/// Never resolves for an empty slot.
async fn settle<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    let output = match slot.as_mut() {
        Some(operation) => operation.await,
        None => pending().await,
    };
    *slot = None;
    output
}

// ============================================================================
// Tests
// ============================================================================
