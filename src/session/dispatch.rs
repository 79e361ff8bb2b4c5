//! The dispatch bridge
//!
//! A [`Dispatch`] is the callback handle a running runtime instance uses to
//! push messages back to its connection. It serializes the message to a
//! JSON text frame and posts it into the connection's own event selector
//! as a passthrough frame; the session loop forwards it unmodified through
//! the send capability. Delivery is fire-and-forget and order-preserving
//! per sender.

use std::marker::PhantomData;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::SendError;
use crate::transport::SocketEvent;

/// Outbound callback handle given to the runtime at start
pub struct Dispatch<M> {
    events: mpsc::UnboundedSender<SocketEvent>,
    _message: PhantomData<fn(M)>,
}

impl<M> Clone for Dispatch<M> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            _message: PhantomData,
        }
    }
}

impl<M: Serialize> Dispatch<M> {
    /// Bind a dispatch handle to a connection's event selector.
    pub fn new(events: mpsc::UnboundedSender<SocketEvent>) -> Self {
        Self {
            events,
            _message: PhantomData,
        }
    }

    /// Serialize `message` and push it toward the connection.
    ///
    /// Fails if the message cannot be encoded or the connection is gone;
    /// the runtime may ignore the result, in which case the failure is the
    /// transport's concern.
    pub fn send(&self, message: &M) -> Result<(), SendError> {
        let frame = serde_json::to_string(message)?;
        self.events
            .send(SocketEvent::Custom(frame))
            .map_err(|_| SendError::Closed)
    }
}
