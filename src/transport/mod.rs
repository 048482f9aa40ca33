//! Transport layer.
//!
//! Sessions talk to the remote end through a split connection: a
//! [`FrameSource`] read half and a [`FrameSink`] write half, produced by a
//! [`Connector`]. The default connector speaks WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                             ┌──────────────────┐
//! │  Session         │                             │  Remote end      │
//! │                  │        WebSocket            │  (DevTools)      │
//! │  MessageReader ◄─┼─────────────────────────────┼─                 │
//! │  OutboundQueue  ─┼─────────────────────────────┼►                 │
//! └──────────────────┘                             └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Transport traits and [`Fragment`] |
//! | `reader` | Fragment reassembly into whole messages |
//! | `queue` | Outbound FIFO with a single writer |
//! | `websocket` | `tokio-tungstenite` connector |

// ============================================================================
// Submodules
// ============================================================================

/// Transport traits.
pub mod socket;

/// Inbound message reassembly.
pub mod reader;

/// Outbound message queue.
pub mod queue;

/// WebSocket transport.
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use queue::OutboundQueue;
pub use reader::{MessageReader, ReadOutcome};
pub use socket::{Connector, Fragment, FrameSink, FrameSource, TransportLimits};
pub use websocket::{FrameKind, WebSocketConnector, WebSocketSink, WebSocketSource};
