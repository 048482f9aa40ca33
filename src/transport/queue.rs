//! Outbound message queue.
//!
//! Any number of callers enqueue payloads; only the session loop drains
//! them. The queue tracks whether a write is in flight so that a wake-up is
//! only signalled when the queue goes from empty-and-idle to non-empty. While
//! a write is in flight its completion pumps the next payload instead.
//!
//! # Single Writer
//!
//! [`Writer`] owns the sink. Pumping moves the sink into the returned
//! [`WriteOp`]; it comes back with the write's result, so a second write can
//! never start while one is outstanding.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::socket::FrameSink;

// ============================================================================
// Types
// ============================================================================

/// An in-flight write. Resolves to the sink and the send result.
pub(crate) type WriteOp<W> = BoxFuture<'static, (W, Result<()>)>;

/// What happens to newly enqueued payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Admission {
    /// Queued for sending.
    #[default]
    Open,
    /// Accepted and dropped. The connection is closing from the remote side.
    Discard,
    /// Rejected with [`Error::ConnectionClosed`].
    Sealed,
}

/// Queue state, guarded by a single lock.
#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Bytes>,
    in_flight: bool,
    admission: Admission,
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO buffer of payloads waiting to be written to the socket.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload to the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the queue is sealed. While
    /// discarding, the payload is dropped and `Ok` is returned.
    pub fn enqueue(&self, payload: Bytes) -> Result<()> {
        let wake = {
            let mut state = self.state.lock();
            match state.admission {
                Admission::Open => {}
                Admission::Discard => {
                    debug!(len = payload.len(), "Dropping payload, remote end is closing");
                    return Ok(());
                }
                Admission::Sealed => return Err(Error::ConnectionClosed),
            }
            let wake = state.pending.is_empty() && !state.in_flight;
            state.pending.push_back(payload);
            wake
        };

        if wake {
            self.ready.notify_one();
        }

        Ok(())
    }

    /// Waits for the "new work available" signal.
    ///
    /// A signal raised while nobody is waiting is kept for the next waiter.
    #[inline]
    pub fn notified(&self) -> Notified<'_> {
        self.ready.notified()
    }

    /// Stops accepting payloads. Already queued payloads stay queued.
    pub fn seal(&self) {
        self.state.lock().admission = Admission::Sealed;
    }

    /// Accepts further payloads but drops them instead of queueing.
    ///
    /// Has no effect on a sealed queue.
    pub fn discard_incoming(&self) {
        let mut state = self.state.lock();
        if state.admission == Admission::Open {
            state.admission = Admission::Discard;
        }
    }

    /// Drops all unsent payloads and returns how many were dropped.
    pub fn discard(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.pending.len();
        state.pending.clear();
        count
    }

    /// Returns the number of payloads waiting to be sent.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if no payload is waiting.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Returns `true` once the queue rejects new payloads.
    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.lock().admission == Admission::Sealed
    }

    /// Takes the head payload if no write is in flight.
    fn begin_write(&self) -> Option<Bytes> {
        let mut state = self.state.lock();
        if state.in_flight {
            return None;
        }
        let payload = state.pending.pop_front()?;
        state.in_flight = true;
        Some(payload)
    }

    /// Marks the in-flight write as finished.
    fn complete_write(&self) {
        self.state.lock().in_flight = false;
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Drains an [`OutboundQueue`] into a sink, one payload at a time.
pub(crate) struct Writer<W> {
    queue: Arc<OutboundQueue>,
    /// `None` while a write is in flight.
    sink: Option<W>,
}

impl<W: FrameSink> Writer<W> {
    pub(crate) fn new(queue: Arc<OutboundQueue>, sink: W) -> Self {
        Self {
            queue,
            sink: Some(sink),
        }
    }

    /// Starts sending the head payload if the sink is idle.
    ///
    /// Returns the in-flight write, or `None` if a write is already in
    /// flight or there is nothing to send.
    pub(crate) fn pump(&mut self) -> Option<WriteOp<W>> {
        let mut sink = self.sink.take()?;

        let Some(payload) = self.queue.begin_write() else {
            self.sink = Some(sink);
            return None;
        };

        trace!(len = payload.len(), "Starting write");

        Some(
            async move {
                let result = sink.send_frame(payload).await;
                (sink, result)
            }
            .boxed(),
        )
    }

    /// Takes back the sink after its write completed.
    pub(crate) fn complete(&mut self, sink: W) {
        self.queue.complete_write();
        self.sink = Some(sink);
    }

    /// Returns `true` while a write is in flight.
    #[inline]
    pub(crate) fn is_busy(&self) -> bool {
        self.sink.is_none()
    }

    /// Takes the sink for the close handshake. `None` if a write is in flight.
    pub(crate) fn take_sink(&mut self) -> Option<W> {
        self.sink.take()
    }
}

// ============================================================================
// Tests
// ============================================================================
