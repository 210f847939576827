use std::time::Duration;

use crate::types::{Tick, NO_TICK};

/// Fixed-rate tick counter driven by elapsed wall time.
///
/// The clock reports [`NO_TICK`] until one whole tick interval has been
/// accumulated. Afterwards the tick only moves forward, unless it is
/// explicitly [`reset`](TickClock::reset).
pub struct TickClock {
    tick_interval: Duration,
    accumulated: Duration,
    current_tick: Tick,
}

impl TickClock {
    /// Creates a clock ticking `tick_rate` times per second.
    /// A rate of zero is treated as one tick per second.
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_interval: Duration::from_secs(1) / tick_rate,
            accumulated: Duration::ZERO,
            current_tick: NO_TICK,
        }
    }

    /// Adds elapsed wall time, returns whether the current tick changed
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        self.accumulated += elapsed;
        let mut changed = false;
        while self.accumulated >= self.tick_interval {
            self.accumulated -= self.tick_interval;
            self.current_tick = self.current_tick.saturating_add(1);
            changed = true;
        }
        changed
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Jumps to `tick`, discarding any partially accumulated interval
    pub fn reset(&mut self, tick: Tick) {
        self.current_tick = tick;
        self.accumulated = Duration::ZERO;
    }
}
