use thiserror::Error;

use snapsync_serde::SerdeErr;

/// Errors that can occur while building or reading snapshots
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The outgoing buffer cannot hold the snapshot. This is a logic error.
    #[error("Snapshot needs {required} bytes but the buffer can only hold {capacity}")]
    BufferSizing { required: usize, capacity: usize },

    /// The header declares a record count the body cannot contain
    #[error("Snapshot declares {count} {kind} records but only {remaining} bytes remain")]
    InvalidRecordCount {
        kind: &'static str,
        count: i32,
        remaining: usize,
    },

    /// The snapshot body could not be decoded
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] SerdeErr),
}
