//! # Snapsync Manager
//! Runs a snapsync server, client or host. The [`NetworkManager`] approves
//! connections, routes inbound messages to the replication core and drives
//! it in a fixed order once per frame.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod config;
mod connection;
mod error;
mod events;
mod manager;
mod metrics;

pub use config::NetworkConfig;
pub use connection::{ConnectionRegistry, ConnectionState, PendingClient};
pub use error::{ConnectionError, ManagerError};
pub use events::{
    ApprovalRequestEvent, ConnectEvent, DespawnEvent, DisconnectEvent, ErrorEvent,
    GainedOwnershipEvent, LostOwnershipEvent, MessageEvent, NetworkEvent, NetworkEvents,
    ParentChangedEvent, SpawnEvent,
};
pub use manager::{LifecycleState, NetworkManager};
pub use metrics::{FrameMetrics, NetworkMetrics};
