//! The per-connection lifecycle state machine
//!
//! State only moves forward: `Uninitialized` → `Initialized` → `Running`,
//! with `Terminated` reachable from anywhere. There is no rollback; a
//! failed upgrade leaves the state where it was, and only transport
//! closure destroys it.

use crate::transport::FrameSink;

/// Lifecycle state of one connection
pub enum ConnectionState<H> {
    /// No send capability yet; the transport has not opened
    Uninitialized,

    /// Transport ready, no runtime attached
    Initialized {
        /// Send capability bound at connection open
        sink: FrameSink,
    },

    /// A live runtime instance is attached
    Running {
        /// Send capability, still needed for passthrough frames
        sink: FrameSink,
        /// The attached runtime instance
        runtime: H,
    },

    /// Connection torn down; terminal
    Terminated,
}

impl<H> ConnectionState<H> {
    /// The send capability, if the transport has opened and not yet closed.
    pub fn sink(&self) -> Option<&FrameSink> {
        match self {
            ConnectionState::Initialized { sink } | ConnectionState::Running { sink, .. } => {
                Some(sink)
            }
            ConnectionState::Uninitialized | ConnectionState::Terminated => None,
        }
    }

    /// Whether a runtime instance is attached.
    pub fn is_running(&self) -> bool {
        matches!(self, ConnectionState::Running { .. })
    }

    /// Short state name for log context.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Initialized { .. } => "initialized",
            ConnectionState::Running { .. } => "running",
            ConnectionState::Terminated => "terminated",
        }
    }
}
