use std::time::Duration;

use log::{debug, info, warn};

use snapsync_shared::{
    ArchetypeRegistry, ClientId, ConnectionId, ConnectionRequestMessage, DeliveryClass,
    DispatchError, EventKind, HostType, MessageType, NetworkObject, ObjectDirectory, ObjectId,
    RttStats, SnapshotEngine, SpawnParams, Tick, Transform, Transport, TransportError,
    SERVER_CLIENT_ID,
};

use crate::{
    config::NetworkConfig,
    connection::{ConnectionState, PendingClient},
    error::{ConnectionError, ManagerError},
    events::NetworkEvents,
    manager::{
        handlers::{self, Dispatch},
        lifecycle::LifecycleState,
        manager_state::ManagerState,
    },
    metrics::NetworkMetrics,
};

/// Runs one server, client or host session: polls the transport, routes
/// inbound messages, drives the replication core once per frame and flushes
/// what it produced back to the transport.
///
/// Call [`early_update`](NetworkManager::early_update) before the game
/// updates its objects and [`late_update`](NetworkManager::late_update)
/// after, or [`update`](NetworkManager::update) to run both.
pub struct NetworkManager {
    transport: Option<Box<dyn Transport>>,
    dispatch: Dispatch,
    state: ManagerState,
}

impl NetworkManager {
    /// Create a new NetworkManager. Every peer of a session has to register
    /// the same archetypes.
    pub fn new(config: NetworkConfig, archetypes: ArchetypeRegistry) -> Self {
        Self {
            transport: None,
            dispatch: Dispatch::new(),
            state: ManagerState::new(config, archetypes),
        }
    }

    // Lifecycle

    /// Starts accepting clients
    ///
    /// Returns an error if a session is already running or the transport
    /// fails to start.
    pub fn start_server(&mut self, transport: Box<dyn Transport>) -> Result<(), ManagerError> {
        self.start(transport, true, false)
    }

    /// Connects to a server and asks for approval
    ///
    /// Returns an error if a session is already running or the transport
    /// fails to start.
    pub fn start_client(&mut self, transport: Box<dyn Transport>) -> Result<(), ManagerError> {
        self.start(transport, false, true)
    }

    /// Starts a server with a local client that is approved right away
    ///
    /// Returns an error if a session is already running or the transport
    /// fails to start.
    pub fn start_host(&mut self, transport: Box<dyn Transport>) -> Result<(), ManagerError> {
        self.start(transport, true, true)
    }

    fn start(
        &mut self,
        mut transport: Box<dyn Transport>,
        is_server: bool,
        is_client: bool,
    ) -> Result<(), ManagerError> {
        if self.state.lifecycle != LifecycleState::Idle {
            return Err(ManagerError::AlreadyStarted);
        }
        if is_server {
            transport.start_server()?;
        } else {
            transport.start_client()?;
        }

        let host_type = if is_server {
            HostType::Server
        } else {
            HostType::Client
        };
        self.state.reset(host_type);
        self.state.is_server = is_server;
        self.state.is_client = is_client;
        self.dispatch = match host_type {
            HostType::Server => handlers::server_dispatch(),
            HostType::Client => handlers::client_dispatch(),
        };

        if is_server && is_client {
            self.state
                .connections
                .try_insert(PendingClient::connected(SERVER_CLIENT_ID, None))?;
            self.state.events.push_connection(SERVER_CLIENT_ID);
        } else if is_client {
            let deadline = self.state.now + self.state.config.approval_timeout;
            self.state.connections.try_insert(PendingClient::new(
                SERVER_CLIENT_ID,
                Some(transport.server_connection_id()),
                deadline,
            ))?;
        }

        self.transport = Some(transport);
        self.state.lifecycle = LifecycleState::Listening;
        info!(
            "network manager started as {}",
            match (is_server, is_client) {
                (true, true) => "host",
                (true, false) => "server",
                _ => "client",
            }
        );
        Ok(())
    }

    /// Requests a shutdown, completed by the next `late_update`. A graceful
    /// shutdown flushes what is queued and tells the peers, passing
    /// `discard_messages` skips the flush.
    pub fn shutdown(&mut self, discard_messages: bool) {
        match self.state.lifecycle {
            LifecycleState::Idle => {}
            LifecycleState::ShuttingDown => {
                self.state.discard_on_shutdown |= discard_messages;
            }
            LifecycleState::Listening => {
                info!("network manager shutting down");
                self.state.lifecycle = LifecycleState::ShuttingDown;
                self.state.discard_on_shutdown = discard_messages;
            }
        }
    }

    fn finish_shutdown(&mut self) {
        // teardown runs while the role flags still describe the session
        self.state.directory.clear();
        self.state.collect_object_events();
        self.state.snapshot.clear();

        if let Some(mut transport) = self.transport.take() {
            if self.state.is_server {
                for client in self.state.connections.connected_clients() {
                    if let Some(connection) = self.state.connections.connection(client) {
                        transport.disconnect_remote(connection);
                    }
                }
            } else {
                transport.disconnect_local();
            }
            transport.shutdown();
        }

        self.state.is_server = false;
        self.state.is_client = false;
        self.state.connections.clear();
        self.state.outbox.clear();
        self.state.lifecycle = LifecycleState::Idle;
        info!("network manager stopped");
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lifecycle
    }

    pub fn is_listening(&self) -> bool {
        self.state.lifecycle == LifecycleState::Listening
    }

    pub fn is_server(&self) -> bool {
        self.state.is_server
    }

    pub fn is_client(&self) -> bool {
        self.state.is_client
    }

    pub fn is_host(&self) -> bool {
        self.state.is_server && self.state.is_client
    }

    /// Whether this client finished approval
    pub fn is_connected_client(&self) -> bool {
        self.state.is_connected_client()
    }

    /// The id of the local client: assigned by the server once approved,
    /// `SERVER_CLIENT_ID` on a server or host
    pub fn local_client_id(&self) -> ClientId {
        self.state.local_client()
    }

    pub fn current_tick(&self) -> Tick {
        self.state.clock.current_tick()
    }

    // Frame

    /// Advances time, then receives and applies everything the transport has
    pub fn early_update(&mut self, elapsed: Duration) {
        if self.state.lifecycle != LifecycleState::Listening {
            return;
        }
        self.state.now += elapsed;
        self.state.clock.advance(elapsed);
        let tick = self.state.clock.current_tick();
        self.state.snapshot.set_tick(tick);

        self.poll_transport();
        self.check_approval_deadlines();

        let resolved = self.state.directory.check_orphans();
        if resolved > 0 {
            debug!("{} orphans found their parent", resolved);
        }
        self.state.collect_object_events();
    }

    /// Writes variable deltas and snapshots, flushes the send queue and
    /// closes the frame
    pub fn late_update(&mut self) {
        let shutting_down = match self.state.lifecycle {
            LifecycleState::Idle => return,
            LifecycleState::Listening => false,
            LifecycleState::ShuttingDown => true,
        };

        if shutting_down && self.state.discard_on_shutdown {
            let discarded = self.state.outbox.len();
            self.state.outbox.clear();
            debug!("discarded {} queued messages", discarded);
        } else {
            let (directory, mut ctx) = self.state.replication();
            directory.issue_deferred(&mut ctx);
            let deltas = directory.write_variable_deltas(&mut ctx);
            if deltas > 0 {
                debug!("queued {} variable deltas", deltas);
            }

            let connected = self.state.connections.connected_clients();
            let is_connected_client = self.state.is_connected_client();
            let now = self.state.now;
            self.state
                .snapshot
                .tick(&connected, is_connected_client, now, &mut self.state.outbox);
            self.flush_outbox();
        }

        let counters = self.state.snapshot.take_counters();
        self.state.metrics.dispatch(counters);
        self.state.directory.warn_orphans();
        self.state.collect_object_events();

        if shutting_down {
            self.finish_shutdown();
        }
    }

    /// Runs `early_update` then `late_update`
    pub fn update(&mut self, elapsed: Duration) {
        self.early_update(elapsed);
        self.late_update();
    }

    fn poll_transport(&mut self) {
        while self.state.lifecycle == LifecycleState::Listening {
            let Some(event) = self.transport.as_mut().and_then(|transport| transport.poll_event()) else {
                break;
            };
            match event.kind {
                EventKind::Connect => self.handle_connect(event.connection),
                EventKind::Data => self.handle_data(event.connection, &event.payload),
                EventKind::Disconnect => self.handle_disconnect(event.connection),
                EventKind::TransportFailure => self.handle_transport_failure(event.connection),
            }
        }
    }

    fn handle_connect(&mut self, connection: ConnectionId) {
        if self.state.is_server {
            let deadline = self.state.now + self.state.config.approval_timeout;
            let client = self.state.connections.add_pending(connection, deadline);
            debug!("connection {} registered as pending client {}", connection, client);
            return;
        }

        let request = ConnectionRequestMessage {
            payload: self.state.config.connection_data.clone(),
        };
        match self.state.connections.try_advance(
            SERVER_CLIENT_ID,
            ConnectionState::PendingConnection,
            ConnectionState::PendingApproval,
        ) {
            Ok(()) => {
                self.state.outbox.send(SERVER_CLIENT_ID, &request);
                debug!("connected to the server, requesting approval");
            }
            Err(error) => self.state.events.push_error(error.into()),
        }
    }

    fn handle_data(&mut self, connection: ConnectionId, payload: &[u8]) {
        self.state.metrics.track_received(payload.len());
        let sender = if self.state.is_server {
            match self.state.connections.client_id(connection) {
                Some(client) => client,
                None => {
                    warn!("dropping data from unknown connection {}", connection);
                    return;
                }
            }
        } else {
            SERVER_CLIENT_ID
        };

        if let Err(error) = self.receive_message(sender, payload) {
            warn!("dropping message from client {}: {}", sender, error);
            self.state.events.push_error(error);
        }
    }

    fn receive_message(&mut self, sender: ClientId, payload: &[u8]) -> Result<(), ManagerError> {
        let (message_type, mut reader) = Dispatch::read_frame(payload)?;

        let handshake = if self.state.is_server {
            MessageType::ConnectionRequest
        } else {
            MessageType::ConnectionApproved
        };
        if message_type != handshake && !self.state.connections.is_connected(sender) {
            warn!(
                "dropping {} from client {} that is not approved",
                message_type, sender
            );
            return Ok(());
        }

        if message_type.is_custom() {
            self.state
                .events
                .push_message(sender, message_type.id(), reader.read_rest().to_vec());
            return Ok(());
        }

        let handler = self
            .dispatch
            .handler(&message_type)
            .ok_or_else(|| DispatchError::NoHandler {
                message_type: message_type.to_string(),
            })?;
        handler(&mut self.state, sender, &mut reader)
    }

    fn handle_disconnect(&mut self, connection: ConnectionId) {
        if self.state.is_server {
            if let Some(client) = self.state.connections.client_id(connection) {
                self.state.drop_client(client);
            }
            return;
        }
        info!("the server closed the connection");
        self.state.events.push_disconnection(SERVER_CLIENT_ID);
        self.shutdown(true);
    }

    fn handle_transport_failure(&mut self, connection: ConnectionId) {
        warn!("transport failure on connection {}", connection);
        self.state
            .events
            .push_error(TransportError::ConnectionFailed { connection }.into());
        if self.state.is_server {
            if let Some(client) = self.state.connections.client_id(connection) {
                if let Some(transport) = self.transport.as_mut() {
                    transport.disconnect_remote(connection);
                }
                self.state.drop_client(client);
            }
        } else {
            self.state.events.push_disconnection(SERVER_CLIENT_ID);
            self.shutdown(true);
        }
    }

    fn check_approval_deadlines(&mut self) {
        for client in self.state.connections.expired(self.state.now) {
            warn!(
                "client {} was not approved within {:?}",
                client, self.state.config.approval_timeout
            );
            if self.state.is_server {
                if let (Some(connection), Some(transport)) =
                    (self.state.connections.connection(client), self.transport.as_mut())
                {
                    transport.disconnect_remote(connection);
                }
                self.state.drop_client(client);
            } else {
                self.shutdown(true);
            }
        }
    }

    fn flush_outbox(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            self.state.outbox.clear();
            return;
        };
        let server_connection = transport.server_connection_id();
        for message in self.state.outbox.drain() {
            let connection = if self.state.is_server {
                match self.state.connections.connection(message.client) {
                    Some(connection) => connection,
                    None => {
                        debug!("dropping message for client {} without a connection", message.client);
                        continue;
                    }
                }
            } else {
                server_connection
            };
            match transport.send(connection, &message.bytes, message.delivery) {
                Ok(()) => self.state.metrics.track_sent(message.bytes.len()),
                Err(error) => {
                    warn!("cannot send to client {}: {}", message.client, error);
                    self.state.events.push_error(error.into());
                }
            }
        }
    }

    fn ensure_listening(&self, operation: &'static str) -> Result<(), ManagerError> {
        if self.state.lifecycle != LifecycleState::Listening {
            return Err(ManagerError::NotListening { operation });
        }
        Ok(())
    }

    fn ensure_server(&self, operation: &'static str) -> Result<(), ManagerError> {
        self.ensure_listening(operation)?;
        if !self.state.is_server {
            return Err(ManagerError::NotServer { operation });
        }
        Ok(())
    }

    // Connections

    /// Approves a client that asked to connect
    ///
    /// Returns an error if this is not a server or the client is not waiting
    /// for approval.
    pub fn approve_client(&mut self, client: ClientId) -> Result<(), ManagerError> {
        self.ensure_server("approve clients")?;
        self.state.approve_client(client)
    }

    /// Refuses a client that asked to connect and closes its connection
    ///
    /// Returns an error if this is not a server or the client is not waiting
    /// for approval.
    pub fn reject_client(&mut self, client: ClientId) -> Result<(), ManagerError> {
        self.ensure_server("reject clients")?;
        let state = self
            .state
            .connections
            .state(client)
            .ok_or(ConnectionError::UnknownClient { client })?;
        if state != ConnectionState::PendingApproval {
            return Err(ConnectionError::InvalidState {
                client,
                actual: state,
                expected: ConnectionState::PendingApproval,
            }
            .into());
        }
        if let (Some(connection), Some(transport)) =
            (self.state.connections.connection(client), self.transport.as_mut())
        {
            transport.disconnect_remote(connection);
        }
        self.state.drop_client(client);
        info!("client {} rejected", client);
        Ok(())
    }

    /// Closes the connection of a client and cleans up after it
    pub fn disconnect_client(&mut self, client: ClientId) -> Result<(), ManagerError> {
        self.ensure_server("disconnect clients")?;
        let connection = self
            .state
            .connections
            .get(client)
            .ok_or(ConnectionError::UnknownClient { client })?
            .connection();
        if let (Some(connection), Some(transport)) = (connection, self.transport.as_mut()) {
            transport.disconnect_remote(connection);
        }
        self.state.drop_client(client);
        Ok(())
    }

    /// Every approved client, the local client of a host included
    pub fn connected_clients(&self) -> Vec<ClientId> {
        self.state.connections.connected_clients()
    }

    pub fn connection_state(&self, client: ClientId) -> Option<ConnectionState> {
        self.state.connections.state(client)
    }

    /// Round trip times measured through snapshot acknowledgements
    pub fn rtt(&self, client: ClientId) -> RttStats {
        self.state.snapshot.rtt(&client)
    }

    // Objects

    /// Spawns an object on every connected client it is visible to
    ///
    /// # Panics
    ///
    /// Panics if the spawn is invalid.
    /// Consider using `try_spawn` for non-panicking error handling.
    pub fn spawn(&mut self, params: SpawnParams) -> ObjectId {
        match self.try_spawn(params) {
            Ok(object_id) => object_id,
            Err(error) => panic!("Cannot spawn object: {}", error),
        }
    }

    /// Spawns an object on every connected client it is visible to
    pub fn try_spawn(&mut self, params: SpawnParams) -> Result<ObjectId, ManagerError> {
        self.ensure_listening("spawn objects")?;
        let connected = self.state.connections.connected_clients();
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_spawn(params, &connected, &mut ctx)?)
    }

    /// Despawns an object everywhere
    ///
    /// # Panics
    ///
    /// Panics if the despawn is invalid.
    /// Consider using `try_despawn` for non-panicking error handling.
    pub fn despawn(&mut self, object_id: ObjectId) {
        if let Err(error) = self.try_despawn(object_id) {
            panic!("Cannot despawn object: {}", error);
        }
    }

    pub fn try_despawn(&mut self, object_id: ObjectId) -> Result<(), ManagerError> {
        self.ensure_listening("despawn objects")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_despawn(object_id, &mut ctx)?)
    }

    /// Despawns every object flagged to be destroyed with its scene. Returns
    /// how many were despawned.
    pub fn try_despawn_scene_objects(&mut self) -> Result<usize, ManagerError> {
        self.ensure_listening("unload scene objects")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_despawn_scene_objects(&mut ctx)?)
    }

    pub fn try_show(&mut self, object_id: ObjectId, client: ClientId) -> Result<(), ManagerError> {
        self.ensure_listening("change visibility")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_show(object_id, client, &mut ctx)?)
    }

    pub fn try_hide(&mut self, object_id: ObjectId, client: ClientId) -> Result<(), ManagerError> {
        self.ensure_listening("change visibility")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_hide(object_id, client, &mut ctx)?)
    }

    /// Reparents an object, `None` detaches it
    pub fn try_set_parent(
        &mut self,
        object_id: ObjectId,
        parent: Option<ObjectId>,
        world_position_stays: bool,
    ) -> Result<(), ManagerError> {
        self.ensure_listening("reparent objects")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_set_parent(object_id, parent, world_position_stays, &mut ctx)?)
    }

    pub fn try_change_ownership(
        &mut self,
        object_id: ObjectId,
        new_owner: ClientId,
    ) -> Result<(), ManagerError> {
        self.ensure_listening("change ownership")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_change_ownership(object_id, new_owner, &mut ctx)?)
    }

    /// Hands an object back to the server
    pub fn try_remove_ownership(&mut self, object_id: ObjectId) -> Result<(), ManagerError> {
        self.ensure_listening("change ownership")?;
        let (directory, mut ctx) = self.state.replication();
        Ok(directory.try_remove_ownership(object_id, &mut ctx)?)
    }

    pub fn set_transform(&mut self, object_id: ObjectId, transform: Transform) -> Result<(), ManagerError> {
        Ok(self.state.directory.set_transform(object_id, transform)?)
    }

    pub fn object(&self, object_id: ObjectId) -> Option<&NetworkObject> {
        self.state.directory.get(object_id)
    }

    /// Mutable access to an object, for example to write its variables
    pub fn object_mut(&mut self, object_id: ObjectId) -> Option<&mut NetworkObject> {
        self.state.directory.get_mut(object_id)
    }

    pub fn directory(&self) -> &ObjectDirectory {
        &self.state.directory
    }

    pub fn snapshot(&self) -> &SnapshotEngine {
        &self.state.snapshot
    }

    // Messages

    /// Queues a user message. `message_id` has to be in the custom range.
    /// A client can only send to `SERVER_CLIENT_ID`.
    pub fn send_custom_message(
        &mut self,
        client: ClientId,
        message_id: u8,
        delivery: DeliveryClass,
        payload: &[u8],
    ) -> Result<(), ManagerError> {
        self.ensure_listening("send messages")?;
        let message_type = MessageType::custom(message_id)?;
        let reachable = if self.state.is_server {
            client != SERVER_CLIENT_ID && self.state.connections.is_connected(client)
        } else {
            client == SERVER_CLIENT_ID && self.state.is_connected_client()
        };
        if !reachable {
            return Err(ConnectionError::UnknownClient { client }.into());
        }
        self.state
            .outbox
            .send_raw(client, message_type, delivery, payload);
        Ok(())
    }

    // Events

    /// Takes everything that happened since the last call
    pub fn take_events(&mut self) -> NetworkEvents {
        self.state.collect_object_events();
        std::mem::take(&mut self.state.events)
    }

    pub fn metrics(&self) -> &NetworkMetrics {
        &self.state.metrics
    }
}
