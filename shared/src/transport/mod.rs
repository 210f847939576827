mod error;

pub use error::TransportError;

use std::time::Duration;

use crate::types::ConnectionId;

/// Reliability and ordering requested for one outgoing payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryClass {
    Reliable,
    ReliableSequenced,
    ReliableFragmentedSequenced,
    Unreliable,
    UnreliableSequenced,
}

impl DeliveryClass {
    pub fn is_reliable(&self) -> bool {
        matches!(
            self,
            DeliveryClass::Reliable
                | DeliveryClass::ReliableSequenced
                | DeliveryClass::ReliableFragmentedSequenced
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Connect,
    Data,
    Disconnect,
    TransportFailure,
}

/// One polled transport occurrence
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub kind: EventKind,
    pub connection: ConnectionId,
    pub payload: Vec<u8>,
    pub receive_time: Duration,
}

impl TransportEvent {
    pub fn new(kind: EventKind, connection: ConnectionId) -> Self {
        Self {
            kind,
            connection,
            payload: Vec::new(),
            receive_time: Duration::ZERO,
        }
    }

    pub fn data(connection: ConnectionId, payload: Vec<u8>, receive_time: Duration) -> Self {
        Self {
            kind: EventKind::Data,
            connection,
            payload,
            receive_time,
        }
    }
}

/// The raw packet layer underneath the replication core.
///
/// Implementations must never block: `poll_event` returns `None` once
/// nothing is pending, and `send` only queues the payload. Transports that do
/// their I/O on other threads have to hand events over through their own
/// queue, since everything here is driven from the single tick thread.
pub trait Transport {
    /// Starts accepting connections
    fn start_server(&mut self) -> Result<(), TransportError>;

    /// Starts connecting to the server
    fn start_client(&mut self) -> Result<(), TransportError>;

    /// Returns the next pending event, if any
    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn send(
        &mut self,
        connection: ConnectionId,
        payload: &[u8],
        delivery: DeliveryClass,
    ) -> Result<(), TransportError>;

    /// Server side: drops one remote connection
    fn disconnect_remote(&mut self, connection: ConnectionId);

    /// Client side: drops the connection to the server
    fn disconnect_local(&mut self);

    fn shutdown(&mut self);

    /// Connection id under which a client sees the server
    fn server_connection_id(&self) -> ConnectionId;
}
