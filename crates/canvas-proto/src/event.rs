use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::led::LedCommand;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Telemetry { telemetry: Telemetry },
    LedChanged { led: LedCommand },
    CommandRejected { command: Command, reason: String },
    SystemFault { system: String, message: String },
    TickDrift { system: String, skipped: u64 },
    LinkStalled { silent_ms: u64 },
    LinkRestored,
    PathLoaded { len: usize },
    WaypointReached { index: usize },
    PathCompleted,
    SchedulerHalted { reason: String },
}

/// Timestamped record published on the observer side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts_unix_ms: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn now(kind: EventKind) -> Self {
        Self {
            ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
        }
    }
}
