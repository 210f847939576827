use thiserror::Error;

use crate::types::ConnectionId;

/// Errors reported by a transport implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport could not start listening or connecting
    #[error("Transport failed to start as {role}: {reason}")]
    StartFailed { role: &'static str, reason: String },

    /// The transport is not running
    #[error("Transport is not started, cannot {operation}")]
    NotStarted { operation: &'static str },

    /// Attempted to send to a connection the transport does not know about
    #[error("Unknown transport connection {connection}")]
    UnknownConnection { connection: ConnectionId },

    /// The payload could not be delivered
    #[error("Failed to send {length} bytes to connection {connection}")]
    SendFailed {
        connection: ConnectionId,
        length: usize,
    },

    /// The transport reported a failure on a live connection
    #[error("Transport failure on connection {connection}")]
    ConnectionFailed { connection: ConnectionId },
}
