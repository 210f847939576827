pub mod rtt_tracker;
