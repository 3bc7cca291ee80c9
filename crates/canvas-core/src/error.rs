use canvas_proto::Command;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LinkError {
    #[error("send {command} failed: {reason}")]
    Send { command: String, reason: String },
    #[error("receive failed: {0}")]
    Recv(String),
    #[error("unparseable message: {0}")]
    Parse(String),
    #[error("command queue closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("vehicle state lock poisoned")]
    Poisoned,
    #[error("vehicle state write borrow re-entered on the same thread")]
    Reentrant,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("waypoint {index}: {field} is not finite")]
    NonFinite { index: usize, field: &'static str },
    #[error("waypoint {index}: brightness {value} outside [0, 1]")]
    Brightness { index: usize, value: f32 },
    #[error("waypoint {index}: negative hold time {value}")]
    HoldTime { index: usize, value: f64 },
}

#[derive(Debug, Clone, Error)]
#[error("command queue full (capacity {capacity}); rejected {}", .command.label())]
pub struct QueueOverflow {
    pub command: Command,
    pub capacity: usize,
}

/// Anything a System can return from `tick`. Only `State` is fatal.
#[derive(Debug, Clone, Error)]
pub enum SystemError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Overflow(#[from] QueueOverflow),
    #[error("{0}")]
    Other(String),
}

impl SystemError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SystemError::State(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum MissionError {
    #[error("mission aborted")]
    Aborted,
    #[error("waypoint system disabled before the path completed")]
    WaypointsDisabled,
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("scheduler is gone")]
    SchedulerGone,
    #[error(transparent)]
    System(#[from] SystemError),
}

impl From<StateError> for MissionError {
    fn from(e: StateError) -> Self {
        MissionError::System(e.into())
    }
}

impl From<PathError> for MissionError {
    fn from(e: PathError) -> Self {
        MissionError::System(e.into())
    }
}
