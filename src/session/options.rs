//! Session configuration.
//!
//! Options can be built fluently or loaded from JSON:
//!
//! ```
//! use std::time::Duration;
//! use devtools_transport::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_max_message_size(16 * 1024 * 1024);
//!
//! let loaded = SessionOptions::from_json(r#"{"connectTimeoutMs": 5000}"#).unwrap();
//! assert_eq!(loaded.connect_timeout(), options.connect_timeout());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default connect timeout (30s).
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Default initial receive buffer size.
const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;

/// Default reason sent with the close frame.
const DEFAULT_CLOSE_REASON: &str = "Closing";

/// Close reasons travel in a control frame payload, capped at 123 bytes.
const MAX_CLOSE_REASON_LEN: usize = 123;

// ============================================================================
// SessionOptions
// ============================================================================

/// Tunables for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOptions {
    /// Maximum time to establish the transport, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Initial capacity of the inbound reassembly buffer.
    pub receive_buffer_size: usize,

    /// Largest accepted inbound message, in bytes. Unlimited if `None`.
    pub max_message_size: Option<usize>,

    /// Reason sent with the close frame on a local close.
    pub close_reason: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            max_message_size: None,
            close_reason: DEFAULT_CLOSE_REASON.to_owned(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed
    /// - [`Error::Config`] if a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the initial receive buffer size.
    #[inline]
    #[must_use]
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    /// Sets the maximum inbound message size.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the close frame reason.
    #[inline]
    #[must_use]
    pub fn with_close_reason(mut self, reason: impl Into<String>) -> Self {
        self.close_reason = reason.into();
        self
    }
}

// ============================================================================
// Accessors & Validation
// ============================================================================

impl SessionOptions {
    /// Returns the connect timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connectTimeoutMs must be greater than 0"));
        }

        if self.receive_buffer_size == 0 {
            return Err(Error::config("receiveBufferSize must be greater than 0"));
        }

        if self.max_message_size == Some(0) {
            return Err(Error::config("maxMessageSize must be greater than 0"));
        }

        if self.close_reason.len() > MAX_CLOSE_REASON_LEN {
            return Err(Error::config(format!(
                "closeReason is {} bytes, limit is {MAX_CLOSE_REASON_LEN}",
                self.close_reason.len()
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
