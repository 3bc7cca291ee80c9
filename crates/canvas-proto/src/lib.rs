pub mod command;
pub mod event;
pub mod led;
pub mod telemetry;

pub use command::{Command, FlightMode, Ned};
pub use event::{Event, EventKind};
pub use led::{LedCommand, Rgb};
pub use telemetry::{Telemetry, TelemetryKind};
