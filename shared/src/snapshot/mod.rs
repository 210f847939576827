mod commands;
mod config;
mod error;
mod header;
mod snapshot_engine;

pub use commands::{DespawnCommand, SpawnCommand, Targets};
pub use config::SnapshotConfig;
pub use error::SnapshotError;
pub use header::SnapshotHeader;
pub use snapshot_engine::{
    ClientAckRecord, SnapshotApplier, SnapshotCounters, SnapshotEngine, SnapshotReceipt,
};
