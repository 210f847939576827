use thiserror::Error;

use snapsync_shared::{
    ClientId, ConnectionId, DispatchError, ObjectError, OwnershipError, SerdeErr, SnapshotError,
    TransportError, VariableError,
};

use crate::connection::ConnectionState;

/// Errors that can occur in the connection registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No client is registered for this transport connection
    #[error("No client registered for transport connection {connection}")]
    UnknownConnection { connection: ConnectionId },

    /// No client is registered under this id
    #[error("No client registered with id {client}")]
    UnknownClient { client: ClientId },

    /// A client with this id is already registered
    #[error("Client {client} is already registered")]
    DuplicateClient { client: ClientId },

    /// The client is not in the state the operation requires
    #[error("Client {client} is {actual:?}, expected {expected:?}")]
    InvalidState {
        client: ClientId,
        actual: ConnectionState,
        expected: ConnectionState,
    },
}

/// Errors reported by the NetworkManager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// A session is already running or shutting down
    #[error("Cannot start, the network manager is already running")]
    AlreadyStarted,

    /// The operation needs a running session
    #[error("The network manager is not listening, cannot {operation}")]
    NotListening { operation: &'static str },

    /// The operation is only available on a server or host
    #[error("Only a server can {operation}")]
    NotServer { operation: &'static str },

    /// Error from the connection registry
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Error from the transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Error while framing or routing a message
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Error from the snapshot engine
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Error from the object directory
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// Error from the ownership table
    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    /// Error from variable replication
    #[error(transparent)]
    Variables(#[from] VariableError),

    /// A message body could not be decoded
    #[error(transparent)]
    Serde(#[from] SerdeErr),
}
