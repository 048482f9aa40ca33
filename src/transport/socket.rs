//! Abstract framed-message channel.
//!
//! The session never talks to a concrete socket. A [`Connector`] produces a
//! read half ([`FrameSource`]) and a write half ([`FrameSink`]); the read half
//! is moved into the single outstanding read operation and the write half
//! into the single in-flight write, so neither can be used twice at once.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::Result;

// ============================================================================
// Fragment
// ============================================================================

/// One chunk of inbound data as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Message data. The last chunk of a message has `end_of_message` set.
    Data {
        /// Fragment bytes.
        payload: Bytes,
        /// `true` for the final fragment of a logical message.
        end_of_message: bool,
    },
    /// The remote end closed the channel.
    Close,
}

impl Fragment {
    /// Creates a non-final fragment.
    #[inline]
    pub fn partial(payload: impl Into<Bytes>) -> Self {
        Self::Data {
            payload: payload.into(),
            end_of_message: false,
        }
    }

    /// Creates the final fragment of a message.
    #[inline]
    pub fn last(payload: impl Into<Bytes>) -> Self {
        Self::Data {
            payload: payload.into(),
            end_of_message: true,
        }
    }
}

// ============================================================================
// TransportLimits
// ============================================================================

/// Limits a [`Connector`] applies to the channel it opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest accepted inbound message, in bytes. Unlimited if `None`.
    pub max_message_size: Option<usize>,
}

// ============================================================================
// Traits
// ============================================================================

/// Read half of a framed-message channel.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Receives the next fragment.
    async fn receive_fragment(&mut self) -> Result<Fragment>;

    /// Returns `false` once the channel can no longer deliver data.
    fn is_open(&self) -> bool;
}

/// Write half of a framed-message channel.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Sends one payload as a complete message.
    async fn send_frame(&mut self, payload: Bytes) -> Result<()>;

    /// Closes the output direction, telling the remote why.
    async fn close_output(&mut self, reason: &str) -> Result<()>;
}

/// Establishes a framed-message channel to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Read half produced by this connector.
    type Source: FrameSource;
    /// Write half produced by this connector.
    type Sink: FrameSink;

    /// Connects to `url` and splits the channel into its halves.
    async fn connect(
        &self,
        url: &Url,
        limits: TransportLimits,
    ) -> Result<(Self::Source, Self::Sink)>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_constructors() {
        assert_eq!(
            Fragment::partial("ab"),
            Fragment::Data {
                payload: Bytes::from_static(b"ab"),
                end_of_message: false,
            }
        );
        assert!(matches!(
            Fragment::last(vec![1u8, 2]),
            Fragment::Data {
                end_of_message: true,
                ..
            }
        ));
    }
}
