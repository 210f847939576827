use std::time::Duration;

use snapsync_shared::{ClientId, ConnectionId};

/// Where a peer is on its way to becoming a connected client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport connected, no connection request yet
    PendingConnection,
    /// The request arrived and waits for the application's verdict
    PendingApproval,
    Connected,
}

// PendingClient

/// One registered peer. Until it is connected it carries the deadline by
/// which it has to be approved.
#[derive(Clone, Debug)]
pub struct PendingClient {
    client_id: ClientId,
    connection: Option<ConnectionId>,
    state: ConnectionState,
    deadline: Option<Duration>,
}

impl PendingClient {
    pub fn new(client_id: ClientId, connection: Option<ConnectionId>, deadline: Duration) -> Self {
        Self {
            client_id,
            connection,
            state: ConnectionState::PendingConnection,
            deadline: Some(deadline),
        }
    }

    /// A peer that needs no approval, like the local client of a host
    pub fn connected(client_id: ClientId, connection: Option<ConnectionId>) -> Self {
        Self {
            client_id,
            connection,
            state: ConnectionState::Connected,
            deadline: None,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Transport connection of the peer, `None` for the local client of a host
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn has_expired(&self, now: Duration) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        if state == ConnectionState::Connected {
            self.deadline = None;
        }
    }
}
