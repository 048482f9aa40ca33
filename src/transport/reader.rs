//! Inbound message reassembly.
//!
//! [`MessageReader`] owns the read half of the channel and turns fragments
//! into complete text messages. The session moves the reader into its one
//! outstanding read operation and gets it back when the read completes.

// ============================================================================
// Imports
// ============================================================================

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::trace;

use crate::error::{Error, Result};

use super::socket::{FrameSource, Fragment};

// ============================================================================
// Constants
// ============================================================================

/// Buffer growth beyond this multiple of the initial capacity is released.
const SHRINK_FACTOR: usize = 4;

// ============================================================================
// Types
// ============================================================================

/// Result of reading one logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete message.
    Message(String),
    /// The remote end closed the channel.
    RemoteClosed,
}

/// An outstanding read. Resolves to the reader and what it read.
pub(crate) type ReadOp<S> = BoxFuture<'static, (MessageReader<S>, Result<ReadOutcome>)>;

// ============================================================================
// MessageReader
// ============================================================================

/// Reassembles fragments from a [`FrameSource`] into messages.
#[derive(Debug)]
pub struct MessageReader<S> {
    source: S,
    buffer: Vec<u8>,
    initial_capacity: usize,
    max_message_size: Option<usize>,
}

impl<S: FrameSource> MessageReader<S> {
    /// Creates a reader with an initial buffer capacity and optional size limit.
    pub fn new(source: S, buffer_capacity: usize, max_message_size: Option<usize>) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(buffer_capacity),
            initial_capacity: buffer_capacity,
            max_message_size,
        }
    }

    /// Reads fragments until a whole message or a close arrives.
    ///
    /// A source that is already closed yields [`ReadOutcome::RemoteClosed`]
    /// without receiving. Fragments of a message interrupted by a close are
    /// discarded.
    ///
    /// # Errors
    ///
    /// - Any error raised by the source
    /// - [`Error::MessageTooLarge`] if the message exceeds the limit
    /// - [`Error::Protocol`] if the message is not valid UTF-8
    pub async fn read_message(&mut self) -> Result<ReadOutcome> {
        self.buffer.clear();

        loop {
            if !self.source.is_open() {
                return Ok(ReadOutcome::RemoteClosed);
            }

            let (payload, end_of_message) = match self.source.receive_fragment().await? {
                Fragment::Data {
                    payload,
                    end_of_message,
                } => (payload, end_of_message),
                Fragment::Close => return Ok(ReadOutcome::RemoteClosed),
            };

            let size = self.buffer.len() + payload.len();
            if let Some(limit) = self.max_message_size
                && size > limit
            {
                return Err(Error::message_too_large(size, limit));
            }

            self.buffer.extend_from_slice(&payload);

            if end_of_message {
                let text = std::str::from_utf8(&self.buffer)
                    .map_err(|e| Error::protocol(format!("Message is not valid UTF-8: {e}")))?
                    .to_owned();
                trace!(len = text.len(), "Message reassembled");
                self.release_oversized_buffer();
                return Ok(ReadOutcome::Message(text));
            }
        }
    }

    /// Gives back memory after an unusually large message.
    ///
    /// Growth up to a few times the initial capacity is kept for reuse.
    fn release_oversized_buffer(&mut self) {
        let keep = self.initial_capacity.saturating_mul(SHRINK_FACTOR);
        if self.buffer.capacity() > keep {
            trace!(
                capacity = self.buffer.capacity(),
                initial = self.initial_capacity,
                "Shrinking receive buffer"
            );
            self.buffer.clear();
            self.buffer.shrink_to(self.initial_capacity);
        }
    }

    /// Returns a reference to the underlying source.
    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Moves the reader into a single outstanding read operation.
    pub(crate) fn into_read_op(mut self) -> ReadOp<S> {
        async move {
            let result = self.read_message().await;
            (self, result)
        }
        .boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================
