use serde::{Deserialize, Serialize};

use crate::led::LedCommand;

/// Vehicle-local NED position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ned {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Ned {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Ned) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
}

/// ArduCopter custom modes we care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightMode {
    #[default]
    Stabilize,
    Acro,
    AltHold,
    Auto,
    Guided,
    Loiter,
    Rtl,
    Circle,
    Land,
    Brake,
    Other(u32),
}

impl FlightMode {
    pub fn from_custom_mode(mode: u32) -> Self {
        match mode {
            0 => FlightMode::Stabilize,
            1 => FlightMode::Acro,
            2 => FlightMode::AltHold,
            3 => FlightMode::Auto,
            4 => FlightMode::Guided,
            5 => FlightMode::Loiter,
            6 => FlightMode::Rtl,
            7 => FlightMode::Circle,
            9 => FlightMode::Land,
            17 => FlightMode::Brake,
            other => FlightMode::Other(other),
        }
    }

    pub fn custom_mode(&self) -> u32 {
        match self {
            FlightMode::Stabilize => 0,
            FlightMode::Acro => 1,
            FlightMode::AltHold => 2,
            FlightMode::Auto => 3,
            FlightMode::Guided => 4,
            FlightMode::Loiter => 5,
            FlightMode::Rtl => 6,
            FlightMode::Circle => 7,
            FlightMode::Land => 9,
            FlightMode::Brake => 17,
            FlightMode::Other(m) => *m,
        }
    }
}

/// Outbound vehicle command. Queue order is send order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Arm,
    Disarm,
    Takeoff { altitude_m: f32 },
    Land,
    Goto(Ned),
    SetLed(LedCommand),
    SetMode { mode: FlightMode },
    Heartbeat,
    RequestStreams { rate_hz: u16 },
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::Arm => "arm",
            Command::Disarm => "disarm",
            Command::Takeoff { .. } => "takeoff",
            Command::Land => "land",
            Command::Goto(_) => "goto",
            Command::SetLed(_) => "set_led",
            Command::SetMode { .. } => "set_mode",
            Command::Heartbeat => "heartbeat",
            Command::RequestStreams { .. } => "request_streams",
        }
    }
}
