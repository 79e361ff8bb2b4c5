//! Error types for the patchwire bridge
//!
//! Domain errors use thiserror; conversions happen at control boundaries.
//! Every kind below is handled locally by the session handler: logged with
//! context and dropped, never re-thrown across the connection loop.

use thiserror::Error;

/// Wire-message decode failures
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope was not a two-element `[tag, payload]` array
    #[error("expected a two-element [tag, payload] array")]
    Envelope,

    /// A join payload field was missing or had the wrong type
    #[error("missing or invalid join field '{0}'")]
    JoinField(&'static str),

    /// The client-event decoder rejected the payload
    #[error("unsupported client event: {0}")]
    Event(String),
}

/// Convenience result alias for codec operations
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Failures pushing a frame onto the connection
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection is gone
    #[error("connection closed")]
    Closed,

    /// The outbound message could not be encoded
    #[error("outbound frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The external runtime failed to initialize
#[derive(Debug, Error)]
#[error("runtime failed to start: {0}")]
pub struct RuntimeStartError(anyhow::Error);

impl From<anyhow::Error> for RuntimeStartError {
    fn from(error: anyhow::Error) -> Self {
        Self(error)
    }
}

/// A message arrived in a state that cannot accept it
#[derive(Debug, Error)]
pub enum OrderingViolation {
    /// A join arrived while the connection was not awaiting a handshake
    #[error("join received while connection is {0}")]
    JoinNotAcceptable(&'static str),

    /// A client event arrived before a successful join
    #[error("client event received before a successful join")]
    EventBeforeJoin,
}

/// Umbrella error for a single session-handler step
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed wire message
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid CSRF token
    #[error("invalid CSRF token")]
    Authorization,

    /// Message received in the wrong state
    #[error("ordering violation: {0}")]
    Ordering(#[from] OrderingViolation),

    /// The runtime could not be started
    #[error(transparent)]
    RuntimeStart(#[from] RuntimeStartError),

    /// Transport send failure
    #[error("send failed: {0}")]
    Send(#[from] SendError),
}

/// Convenience result alias for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;
