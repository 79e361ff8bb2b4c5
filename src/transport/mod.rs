//! The duplex-channel abstraction
//!
//! The session handler never touches a socket directly. It consumes
//! [`SocketEvent`] values fed in by the driver and pushes outbound text
//! frames through a [`FrameSink`], the send capability bound to one
//! connection at open time. The sink enqueues; the driver drains the queue
//! into the real socket, so sends from the session and from the runtime's
//! dispatch callback are serialized per connection.

use tokio::sync::mpsc;

use crate::error::SendError;

/// One event observed on a connection
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A text frame received from the client
    Text(String),

    /// A binary frame received from the client; ignored by the session
    Binary(Vec<u8>),

    /// An internal passthrough frame: already-serialized text originating
    /// from the runtime's dispatch callback, to be forwarded unmodified
    Custom(String),

    /// The client closed the connection
    Closed,

    /// The transport is going away without a close frame
    Shutdown,
}

/// Send capability for one connection
///
/// Cheap to clone; every clone refers to the same connection. Sending fails
/// once the connection is gone.
#[derive(Debug, Clone)]
pub struct FrameSink {
    frames: mpsc::UnboundedSender<String>,
}

impl FrameSink {
    /// Create a sink and the receiving half the driver drains into the
    /// socket.
    pub fn channel() -> (FrameSink, mpsc::UnboundedReceiver<String>) {
        let (frames, rx) = mpsc::unbounded_channel();
        (FrameSink { frames }, rx)
    }

    /// Enqueue a text frame on this connection.
    pub fn send_text(&self, frame: impl Into<String>) -> Result<(), SendError> {
        self.frames
            .send(frame.into())
            .map_err(|_| SendError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sent_frames_arrive_in_order() {
        let (sink, mut rx) = FrameSink::channel();
        sink.send_text("a").unwrap();
        sink.send_text("b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn send_after_receiver_drop_fails() {
        let (sink, rx) = FrameSink::channel();
        drop(rx);
        assert!(matches!(sink.send_text("a"), Err(SendError::Closed)));
    }

    #[test]
    fn clones_share_the_connection() {
        let (sink, mut rx) = FrameSink::channel();
        let clone = sink.clone();
        clone.send_text("from clone").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "from clone");
    }
}
