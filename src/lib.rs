//! Patchwire – a connection-lifecycle bridge between stateful UI runtimes and web clients
//!
//! This crate mediates between a duplex text transport and a server-side
//! rendering runtime:
//! - Static HTML snapshots over plain request/response, with a WebSocket
//!   upgrade on the same routes
//! - A join handshake carrying a CSRF token, validated before any runtime
//!   is instantiated
//! - Strict handshake-before-interaction ordering, enforced per connection
//! - Asynchronous runtime patches routed back onto the originating
//!   connection without interleaving
//! - Fail-soft protocol handling: malformed, unauthorized, or out-of-order
//!   messages are logged and dropped, never fatal to the connection

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Typed error taxonomy for the bridge
pub mod error;

/// Wire-message codec for the `[tag, payload]` envelope
pub mod protocol;

/// Interfaces consumed from the embedding application
pub mod runtime;

/// HTTP entry points and the per-connection socket driver
pub mod server;

/// The per-connection session handler and its state machine
pub mod session;

/// The duplex-channel abstraction
pub mod transport;

// Re-export key types for convenience
pub use runtime::{CsrfValidator, UiRuntime};
pub use server::{LiveEndpoint, SocketOptions, render_component, render_view};
pub use session::{Dispatch, Session, SessionMode};

/// Current version of the patchwire crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
