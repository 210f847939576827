use std::{collections::VecDeque, time::Duration};

/// Number of sends remembered, and of latency samples kept
pub const RTT_WINDOW_SIZE: usize = 64;

#[derive(Clone, Copy)]
struct SentRecord {
    sequence: u32,
    time_sent: Duration,
}

/// Round trip statistics over the current latency window.
/// Every field is zero when no sample has been taken yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RttStats {
    pub best: Duration,
    pub average: Duration,
    pub worst: Duration,
    pub last: Duration,
    pub sample_count: usize,
}

/// Ring buffers of recent send times and measured latencies for one peer
pub struct RttTracker {
    sent: Vec<Option<SentRecord>>,
    latencies: VecDeque<Duration>,
}

impl RttTracker {
    pub fn new() -> Self {
        Self {
            sent: vec![None; RTT_WINDOW_SIZE],
            latencies: VecDeque::with_capacity(RTT_WINDOW_SIZE),
        }
    }

    /// Remembers when `sequence` was sent, overwriting whatever shared its slot
    pub fn notify_send(&mut self, sequence: u32, time_sent: Duration) {
        let slot = sequence as usize % RTT_WINDOW_SIZE;
        self.sent[slot] = Some(SentRecord {
            sequence,
            time_sent,
        });
    }

    /// Records a latency sample if `sequence` still owns its slot.
    /// Returns the measured latency.
    pub fn notify_ack(&mut self, sequence: u32, time_acked: Duration) -> Option<Duration> {
        let slot = sequence as usize % RTT_WINDOW_SIZE;
        let record = self.sent[slot]?;
        if record.sequence != sequence {
            // the slot was reused by a later send
            return None;
        }
        self.sent[slot] = None;

        let latency = time_acked.saturating_sub(record.time_sent);
        if self.latencies.len() == RTT_WINDOW_SIZE {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
        Some(latency)
    }

    pub fn rtt(&self) -> RttStats {
        let Some(last) = self.latencies.back().copied() else {
            return RttStats::default();
        };

        let mut best = Duration::MAX;
        let mut worst = Duration::ZERO;
        let mut total = Duration::ZERO;
        for latency in &self.latencies {
            best = best.min(*latency);
            worst = worst.max(*latency);
            total += *latency;
        }

        let sample_count = self.latencies.len();
        RttStats {
            best,
            average: total / sample_count as u32,
            worst,
            last,
            sample_count,
        }
    }
}

impl Default for RttTracker {
    fn default() -> Self {
        Self::new()
    }
}
