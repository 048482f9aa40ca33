//! Error types for the DevTools transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use devtools_transport::{Result, Session};
//!
//! async fn example(session: Session) -> Result<()> {
//!     let outcome = session.connect(url, handler, None, token).await?;
//!     println!("session ended: {outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Cancelled`] |
//! | Transport | [`Error::Protocol`], [`Error::MessageTooLarge`] |
//! | Handler | [`Error::Handler`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! A remote close or a cancelled session is not an error: both end
//! [`Session::connect`](crate::Session::connect) with an `Ok` outcome.

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

/// Boxed error returned by message and ready handlers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options or connector settings are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    ///
    /// Returned when the connector cannot establish the channel.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    ///
    /// Returned when the connector does not finish within the configured timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Session is closed or closing and no longer accepts outbound data.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The caller's cancellation token fired while waiting.
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Malformed frame or message.
    ///
    /// Returned when an assembled message is not valid UTF-8, or an outbound
    /// payload cannot be framed as text.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Inbound message exceeded the configured maximum size.
    #[error("Message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Bytes received so far for the message.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    // ========================================================================
    // Handler Errors
    // ========================================================================
    /// A message handler or the ready callback failed.
    #[error("Message handler failed: {source}")]
    Handler {
        /// Error returned by the handler.
        source: BoxError,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a message too large error.
    #[inline]
    pub fn message_too_large(size: usize, limit: usize) -> Self {
        Self::MessageTooLarge { size, limit }
    }

    /// Wraps a handler failure.
    #[inline]
    pub fn handler(source: BoxError) -> Self {
        Self::Handler { source }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if a socket operation or inbound framing failed.
    #[inline]
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::WebSocket(_)
                | Self::Protocol { .. }
                | Self::MessageTooLarge { .. }
        )
    }

    /// Returns `true` if a message handler or ready callback failed.
    #[inline]
    #[must_use]
    pub fn is_handler_fault(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
