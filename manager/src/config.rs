use std::{default::Default, time::Duration};

use snapsync_shared::{SnapshotConfig, SpawnDelivery, VariableConfig};

/// Contains Config properties which will be used by the NetworkManager
#[derive(Clone)]
pub struct NetworkConfig {
    /// Ticks per second of the simulation clock
    pub tick_rate: u32,
    /// How long a connection may stay unapproved before it is dropped. A
    /// client that is not approved in time shuts itself down.
    pub approval_timeout: Duration,
    /// Determines whether the application has to approve every client
    /// through `approve_client` / `reject_client`. When false, clients are
    /// approved as soon as their request arrives.
    pub require_approval: bool,
    /// Payload a client sends along with its connection request
    pub connection_data: Vec<u8>,
    /// How spawns and despawns reach clients
    pub spawn_delivery: SpawnDelivery,
    /// Used to configure the snapshot engine
    pub snapshot: SnapshotConfig,
    /// Used to configure variable replication
    pub variables: VariableConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            approval_timeout: Duration::from_secs(10),
            require_approval: false,
            connection_data: Vec::new(),
            spawn_delivery: SpawnDelivery::default(),
            snapshot: SnapshotConfig::default(),
            variables: VariableConfig::default(),
        }
    }
}
