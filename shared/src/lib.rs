//! # Snapsync Shared
//! The replication core shared by snapsync servers, clients and hosts: tick
//! clock, message framing, snapshot engine, object directory, ownership table
//! and variable replication.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

mod connection;
mod messages;
mod snapshot;
mod tick;
mod transport;
mod types;
mod variables;
mod world;

pub use connection::rtt_tracker::{RttStats, RttTracker, RTT_WINDOW_SIZE};
pub use messages::{
    connection_messages::{ConnectionApprovedMessage, ConnectionRequestMessage},
    constants::{FIRST_CUSTOM_MESSAGE_ID, LAST_INTERNAL_MESSAGE_ID},
    error::DispatchError,
    message::NetworkMessage,
    message_dispatch::{MessageDispatch, MessageHandler},
    message_type::MessageType,
    object_messages::{ChangeOwnershipMessage, DestroyObjectMessage, ParentSyncMessage},
    outbox::{OutgoingMessage, Outbox},
};
pub use snapshot::{
    ClientAckRecord, DespawnCommand, SnapshotApplier, SnapshotConfig, SnapshotCounters,
    SnapshotEngine, SnapshotError, SnapshotHeader, SnapshotReceipt, SpawnCommand, Targets,
};
pub use tick::TickClock;
pub use transport::{DeliveryClass, EventKind, Transport, TransportError, TransportEvent};
pub use types::{
    ArchetypeHash, ClientId, ConnectionId, HostType, ObjectId, Tick, Transform, NO_TICK,
    SERVER_CLIENT_ID,
};
pub use variables::{
    DeltaScope, NetworkVariable, ReadPermission, ReadScope, Replicate, Variable, VariableConfig,
    VariableDeltaHeader, VariableError, VariableReplicator, VariableSettings, WritePermission,
};
pub use world::{
    archetype_hash, ArchetypeRegistry, BehaviourFactory, NetworkObject, ObjectDirectory,
    ObjectError, ObjectEvent, OwnershipError, OwnershipTable, ReplicationContext, SpawnDelivery,
    SpawnParams, SpawnState, VisibilityFn,
};
