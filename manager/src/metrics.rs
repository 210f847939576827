use snapsync_shared::SnapshotCounters;

/// Counters for one frame of the network manager
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameMetrics {
    pub snapshots_sent: u64,
    pub snapshots_received: u64,
    /// Spawn commands recorded, counted once per target client
    pub spawns_sent: u64,
    /// Despawn commands recorded, counted once per target client
    pub despawns_sent: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Accumulates the current frame and keeps the last completed one
#[derive(Clone, Debug, Default)]
pub struct NetworkMetrics {
    current: FrameMetrics,
    last_frame: FrameMetrics,
    frames: u64,
}

impl NetworkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> &FrameMetrics {
        &self.last_frame
    }

    pub fn current(&self) -> &FrameMetrics {
        &self.current
    }

    /// Number of frames dispatched so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub(crate) fn track_sent(&mut self, bytes: usize) {
        self.current.messages_sent += 1;
        self.current.bytes_sent += bytes as u64;
    }

    pub(crate) fn track_received(&mut self, bytes: usize) {
        self.current.messages_received += 1;
        self.current.bytes_received += bytes as u64;
    }

    /// Folds in the snapshot counters and closes the frame
    pub(crate) fn dispatch(&mut self, snapshot: SnapshotCounters) {
        self.current.snapshots_sent += snapshot.snapshots_sent;
        self.current.snapshots_received += snapshot.snapshots_received;
        self.current.spawns_sent += snapshot.spawns_recorded;
        self.current.despawns_sent += snapshot.despawns_recorded;
        self.last_frame = std::mem::take(&mut self.current);
        self.frames += 1;
    }
}
