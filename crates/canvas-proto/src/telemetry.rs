use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The part of an inbound message the core acts on, in SI units.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryKind {
    Heartbeat {
        custom_mode: u32,
        base_mode: u8,
        system_status: u8,
        armed: bool,
    },
    Attitude { roll: f32, pitch: f32, yaw: f32 },
    SysStatus {
        voltage_v: Option<f32>,
        current_a: Option<f32>,
        remaining_pct: Option<u8>,
    },
    GlobalPosition {
        lat: f64,
        lon: f64,
        alt_m: f32,
        relative_alt_m: f32,
    },
    LocalPosition { x: f32, y: f32, z: f32 },
    StatusText { severity: String, text: String },
    TerrainReport {
        lat: f64,
        lon: f64,
        terrain_height: f32,
        current_height: f32,
    },
    EkfStatus { flags: u16 },
    CommandAck { command: String, result: String },
    /// Relayed but not interpreted.
    Unknown { name: String },
}

impl TelemetryKind {
    pub fn name(&self) -> &str {
        match self {
            TelemetryKind::Heartbeat { .. } => "HEARTBEAT",
            TelemetryKind::Attitude { .. } => "ATTITUDE",
            TelemetryKind::SysStatus { .. } => "SYS_STATUS",
            TelemetryKind::GlobalPosition { .. } => "GLOBAL_POSITION_INT",
            TelemetryKind::LocalPosition { .. } => "LOCAL_POSITION_NED",
            TelemetryKind::StatusText { .. } => "STATUSTEXT",
            TelemetryKind::TerrainReport { .. } => "TERRAIN_REPORT",
            TelemetryKind::EkfStatus { .. } => "EKF_STATUS_REPORT",
            TelemetryKind::CommandAck { .. } => "COMMAND_ACK",
            TelemetryKind::Unknown { name } => name,
        }
    }
}

impl Default for TelemetryKind {
    fn default() -> Self {
        TelemetryKind::Unknown { name: String::new() }
    }
}

/// One inbound vehicle message. Serializes as `{"type": <MESSAGE_NAME>, ...fields}`
/// with every field exactly as the autopilot sent it; `kind` is the decoded view
/// and never goes on the wire. A record read back from JSON is uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(skip)]
    pub kind: TelemetryKind,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Telemetry {
    /// `fields` gets its `type` set to the message name.
    pub fn new(kind: TelemetryKind, name: &str, mut fields: Map<String, Value>) -> Self {
        fields.insert("type".into(), Value::String(name.to_string()));
        Self { kind, fields }
    }

    /// MAVLink message name; the key under which VehicleState keeps the latest copy.
    pub fn name(&self) -> &str {
        self.fields.get("type").and_then(Value::as_str).unwrap_or_else(|| self.kind.name())
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A decoded view with no raw payload behind it.
impl From<TelemetryKind> for Telemetry {
    fn from(kind: TelemetryKind) -> Self {
        let name = kind.name().to_string();
        Self::new(kind, &name, Map::new())
    }
}
