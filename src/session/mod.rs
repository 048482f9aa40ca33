//! Session layer.
//!
//! A session owns one transport connection and multiplexes three activities
//! over it: receiving whole messages, dispatching them to a handler, and
//! writing queued payloads one at a time.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent session construction |
//! | `core` | [`Session`], [`SessionHandle`] and lifecycle states |
//! | `handler` | Message handler and ready callback types |
//! | `multiplexer` | Main loop (internal) |
//! | `options` | [`SessionOptions`] |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent session construction.
pub mod builder;

/// Session, handle and lifecycle states.
pub mod core;

/// Message handler and ready callback types.
pub mod handler;

pub(crate) mod multiplexer;

/// Session configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use core::{Session, SessionHandle, SessionOutcome, SessionState};
pub use handler::{HandlerResult, MessageHandler, ReadyCallback, on_ready};
pub use options::SessionOptions;
