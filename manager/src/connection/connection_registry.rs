use std::{collections::HashMap, time::Duration};

use snapsync_shared::{ClientId, ConnectionId, SERVER_CLIENT_ID};

use crate::{
    connection::pending_client::{ConnectionState, PendingClient},
    error::ConnectionError,
};

/// Maps transport connections to logical client ids and tracks how far
/// each client got through approval
pub struct ConnectionRegistry {
    clients: HashMap<ClientId, PendingClient>,
    client_connections: HashMap<ConnectionId, ClientId>,
    next_client_id: ClientId,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            client_connections: HashMap::new(),
            next_client_id: SERVER_CLIENT_ID + 1,
        }
    }

    /// Server side: registers a freshly connected transport connection under
    /// a new client id
    pub fn add_pending(&mut self, connection: ConnectionId, deadline: Duration) -> ClientId {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.client_connections.insert(connection, client_id);
        self.clients
            .insert(client_id, PendingClient::new(client_id, Some(connection), deadline));
        client_id
    }

    /// Registers a peer under a known id
    pub fn try_insert(&mut self, client: PendingClient) -> Result<(), ConnectionError> {
        let client_id = client.client_id();
        if self.clients.contains_key(&client_id) {
            return Err(ConnectionError::DuplicateClient { client: client_id });
        }
        if let Some(connection) = client.connection() {
            self.client_connections.insert(connection, client_id);
        }
        self.clients.insert(client_id, client);
        Ok(())
    }

    /// Moves a client from `expected` to `next`
    pub fn try_advance(
        &mut self,
        client_id: ClientId,
        expected: ConnectionState,
        next: ConnectionState,
    ) -> Result<(), ConnectionError> {
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or(ConnectionError::UnknownClient { client: client_id })?;
        if client.state() != expected {
            return Err(ConnectionError::InvalidState {
                client: client_id,
                actual: client.state(),
                expected,
            });
        }
        client.set_state(next);
        Ok(())
    }

    pub fn get(&self, client_id: ClientId) -> Option<&PendingClient> {
        self.clients.get(&client_id)
    }

    pub fn state(&self, client_id: ClientId) -> Option<ConnectionState> {
        self.clients.get(&client_id).map(PendingClient::state)
    }

    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(PendingClient::is_connected)
    }

    pub fn client_id(&self, connection: ConnectionId) -> Option<ClientId> {
        self.client_connections.get(&connection).copied()
    }

    pub fn connection(&self, client_id: ClientId) -> Option<ConnectionId> {
        self.clients
            .get(&client_id)
            .and_then(PendingClient::connection)
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<PendingClient> {
        let client = self.clients.remove(&client_id)?;
        if let Some(connection) = client.connection() {
            self.client_connections.remove(&connection);
        }
        Some(client)
    }

    pub fn remove_connection(&mut self, connection: ConnectionId) -> Option<PendingClient> {
        let client_id = self.client_connections.get(&connection).copied()?;
        self.remove(client_id)
    }

    /// Clients whose approval deadline passed, in ascending order
    pub fn expired(&self, now: Duration) -> Vec<ClientId> {
        let mut expired: Vec<ClientId> = self
            .clients
            .values()
            .filter(|client| client.has_expired(now))
            .map(PendingClient::client_id)
            .collect();
        expired.sort_unstable();
        expired
    }

    /// Every connected client, in ascending order
    pub fn connected_clients(&self) -> Vec<ClientId> {
        let mut connected: Vec<ClientId> = self
            .clients
            .values()
            .filter(|client| client.is_connected())
            .map(PendingClient::client_id)
            .collect();
        connected.sort_unstable();
        connected
    }

    pub fn pending_count(&self) -> usize {
        self.clients
            .values()
            .filter(|client| !client.is_connected())
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
        self.client_connections.clear();
        self.next_client_id = SERVER_CLIENT_ID + 1;
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
