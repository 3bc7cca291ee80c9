use std::time::{Duration, Instant};

/// Link worker bookkeeping, readable from outside the worker threads.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    /// An autopilot HEARTBEAT has been seen.
    pub connected: bool,
    pub last_heartbeat: Option<Instant>,
    pub last_msg: Option<String>,
    pub received: u64,
    pub recv_errors: u64,
    pub sent: u64,
    pub rejected: u64,
}

impl LinkStatus {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }
}
