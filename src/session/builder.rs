//! Session builder.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use devtools_transport::{FrameKind, Session, WebSocketConnector};
//!
//! # fn example() -> devtools_transport::Result<()> {
//! let session = Session::builder()
//!     .connector(WebSocketConnector::new().with_frame_kind(FrameKind::Binary))
//!     .connect_timeout(Duration::from_secs(10))
//!     .max_message_size(64 * 1024 * 1024)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;
use crate::transport::socket::Connector;
use crate::transport::websocket::WebSocketConnector;

use super::core::Session;
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for [`Session`].
#[derive(Debug, Clone)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct SessionBuilder<C = WebSocketConnector> {
    connector: C,
    options: SessionOptions,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Creates a builder with the WebSocket transport and default options.
    #[inline]
    pub fn new() -> Self {
        Self {
            connector: WebSocketConnector::new(),
            options: SessionOptions::default(),
        }
    }
}

impl<C> SessionBuilder<C> {
    /// Replaces the transport.
    #[inline]
    pub fn connector<N: Connector>(self, connector: N) -> SessionBuilder<N> {
        SessionBuilder {
            connector,
            options: self.options,
        }
    }

    /// Replaces all options.
    #[inline]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the initial receive buffer size.
    #[inline]
    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.options = self.options.with_receive_buffer_size(size);
        self
    }

    /// Sets the maximum inbound message size.
    #[inline]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.options = self.options.with_max_message_size(size);
        self
    }

    /// Sets the close frame reason.
    #[inline]
    pub fn close_reason(mut self, reason: impl Into<String>) -> Self {
        self.options = self.options.with_close_reason(reason);
        self
    }
}

impl<C: Connector> SessionBuilder<C> {
    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if an option is invalid.
    pub fn build(self) -> Result<Session<C>> {
        self.options.validate()?;
        Ok(Session::new(self.connector, self.options))
    }
}

// ============================================================================
// Tests
// ============================================================================
