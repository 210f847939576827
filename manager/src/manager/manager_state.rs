use std::time::Duration;

use log::info;

use snapsync_shared::{
    ArchetypeRegistry, ClientId, ConnectionApprovedMessage, HostType, ObjectDirectory, Outbox,
    ReplicationContext, SnapshotEngine, TickClock, VariableReplicator, SERVER_CLIENT_ID,
};

use crate::{
    config::NetworkConfig,
    connection::{ConnectionRegistry, ConnectionState},
    error::ManagerError,
    events::NetworkEvents,
    manager::lifecycle::LifecycleState,
    metrics::NetworkMetrics,
};

/// Everything the message handlers mutate. Owned by the NetworkManager and
/// only touched from its update calls.
pub(crate) struct ManagerState {
    pub(crate) config: NetworkConfig,
    pub(crate) archetypes: ArchetypeRegistry,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) is_server: bool,
    pub(crate) is_client: bool,
    pub(crate) discard_on_shutdown: bool,
    pub(crate) now: Duration,
    pub(crate) clock: TickClock,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) directory: ObjectDirectory,
    pub(crate) snapshot: SnapshotEngine,
    pub(crate) replicator: VariableReplicator,
    pub(crate) outbox: Outbox,
    pub(crate) events: NetworkEvents,
    pub(crate) metrics: NetworkMetrics,
}

impl ManagerState {
    pub(crate) fn new(config: NetworkConfig, archetypes: ArchetypeRegistry) -> Self {
        Self {
            clock: TickClock::new(config.tick_rate),
            directory: ObjectDirectory::new(HostType::Server, archetypes.clone()),
            snapshot: SnapshotEngine::new(HostType::Server, config.snapshot.clone()),
            replicator: VariableReplicator::new(config.variables.clone()),
            archetypes,
            config,
            lifecycle: LifecycleState::Idle,
            is_server: false,
            is_client: false,
            discard_on_shutdown: false,
            now: Duration::ZERO,
            connections: ConnectionRegistry::new(),
            outbox: Outbox::new(),
            events: NetworkEvents::new(),
            metrics: NetworkMetrics::new(),
        }
    }

    /// Fresh replication state for a new session
    pub(crate) fn reset(&mut self, host_type: HostType) {
        self.clock = TickClock::new(self.config.tick_rate);
        self.directory = ObjectDirectory::new(host_type, self.archetypes.clone());
        self.snapshot = SnapshotEngine::new(host_type, self.config.snapshot.clone());
        self.replicator = VariableReplicator::new(self.config.variables.clone());
        self.connections.clear();
        self.outbox.clear();
        self.now = Duration::ZERO;
        self.discard_on_shutdown = false;
    }

    /// Splits out the directory and the collaborators its operations need
    pub(crate) fn replication(&mut self) -> (&mut ObjectDirectory, ReplicationContext<'_>) {
        (
            &mut self.directory,
            ReplicationContext {
                snapshot: &mut self.snapshot,
                replicator: &self.replicator,
                outbox: &mut self.outbox,
                delivery: self.config.spawn_delivery,
            },
        )
    }

    pub(crate) fn is_connected_client(&self) -> bool {
        self.is_client && !self.is_server && self.connections.is_connected(SERVER_CLIENT_ID)
    }

    pub(crate) fn local_client(&self) -> ClientId {
        self.directory.local_client()
    }

    /// Server side: completes the approval of a client and spawns every
    /// object it can see
    pub(crate) fn approve_client(&mut self, client: ClientId) -> Result<(), ManagerError> {
        self.connections.try_advance(
            client,
            ConnectionState::PendingApproval,
            ConnectionState::Connected,
        )?;
        self.outbox.send(
            client,
            &ConnectionApprovedMessage {
                client_id: client,
                server_tick: self.clock.current_tick(),
            },
        );
        let (directory, mut ctx) = self.replication();
        let spawned = directory.on_client_connected(client, &mut ctx);
        self.events.push_connection(client);
        info!("client {} approved, {} objects to spawn", client, spawned);
        Ok(())
    }

    /// Server side: forgets a client. A connected client also loses its
    /// objects and observer entries.
    pub(crate) fn drop_client(&mut self, client: ClientId) {
        let Some(record) = self.connections.remove(client) else {
            return;
        };
        if !record.is_connected() {
            info!("pending client {} dropped", client);
            return;
        }
        let (directory, mut ctx) = self.replication();
        directory.on_client_disconnected(client, &mut ctx);
        self.snapshot.remove_client(&client);
        self.events.push_disconnection(client);
        info!("client {} disconnected", client);
    }

    /// Moves what the directory reported into the event queue
    pub(crate) fn collect_object_events(&mut self) {
        for event in self.directory.take_events() {
            self.events.push_object_event(event);
        }
    }
}
