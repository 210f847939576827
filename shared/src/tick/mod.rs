mod tick_clock;

pub use tick_clock::TickClock;
