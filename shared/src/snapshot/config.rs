/// Contains Config properties which will be used by the snapshot engine
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    /// Largest snapshot message that may be built. Commands that do not fit
    /// stay buffered and go out in later snapshots.
    pub max_message_size: usize,
    /// Tighter byte budget for spawn and despawn records in one snapshot.
    /// `None` leaves `max_message_size` as the only bound.
    pub max_spawn_bytes: Option<usize>,
    /// Resend spawn commands with exponential back-off instead of every tick
    pub resend_backoff: bool,
    /// Surround the snapshot body with integrity sentinels
    pub use_sentinels: bool,
}

impl SnapshotConfig {
    /// Bytes left for spawn and despawn records once the header and the
    /// sentinels are accounted for
    pub fn record_budget(&self, framing_bytes: usize) -> usize {
        let room = self.max_message_size.saturating_sub(framing_bytes);
        match self.max_spawn_bytes {
            Some(limit) => limit.min(room),
            None => room,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_message_size: 30_000,
            max_spawn_bytes: None,
            resend_backoff: false,
            use_sentinels: false,
        }
    }
}
