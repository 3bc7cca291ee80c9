pub mod autodetect;
pub mod link;
pub mod mav;
pub mod status;

use serde::Deserialize;

pub use link::{LinkWorker, Transport};
pub use mav::{MavTransport, Target};
pub use status::LinkStatus;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// MAVLink connection URL, e.g. `tcpout:127.0.0.1:5760` (SITL) or
    /// `serial:/dev/ttyUSB0:57600`. Ignored when `autodetect` picks a port.
    pub connection: String,

    /// Scan candidate serial ports/bauds and use the first that yields a HEARTBEAT.
    pub autodetect: bool,

    /// Autodetect candidates. Defaults cover the usual Pi UART and USB names.
    pub candidate_devs: Option<Vec<String>>,
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per port attempt
    pub heartbeat_timeout_ms: u64,

    /// MAVLink ids we use (GCS side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// Autopilot side. 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    pub telemetry_rate_hz: u16,

    /// No telemetry for this long marks the link stalled.
    pub link_timeout_ms: u64,

    pub queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connection: "tcpout:127.0.0.1:5760".into(),
            autodetect: false,
            candidate_devs: None,
            candidate_bauds: None,
            heartbeat_timeout_ms: 1500,
            sys_id: 255,
            comp_id: 190,
            target_sys: 1,
            target_comp: 1,
            telemetry_rate_hz: 20,
            link_timeout_ms: 3000,
            queue_capacity: canvas_core::queue::DEFAULT_CAPACITY,
        }
    }
}

impl LinkConfig {
    pub fn target(&self) -> Target {
        Target { system: self.target_sys, component: self.target_comp }
    }
}
