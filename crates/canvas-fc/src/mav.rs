use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::{Context, Result};
use canvas_core::LinkError;
use canvas_proto::{Command, Telemetry, TelemetryKind};
use mavlink::ardupilotmega::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType, PositionTargetTypemask,
    COMMAND_LONG_DATA, HEARTBEAT_DATA, LED_CONTROL_DATA, REQUEST_DATA_STREAM_DATA,
    SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, Message};
use serde_json::{Map, Value};
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

use crate::link::Transport;

/// Ignore velocity, acceleration, yaw and yaw rate: position target only.
pub const POSITION_ONLY_MASK: u16 = 0b0000_1101_1111_1000;
/// LED_CONTROL pattern for caller-supplied bytes.
pub const LED_PATTERN_CUSTOM: u8 = 255;
const MAV_DATA_STREAM_ALL: u8 = 0;

/// Autopilot system/component commands are addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

impl Default for Target {
    fn default() -> Self {
        Self { system: 1, component: 1 }
    }
}

fn command_long(target: Target, command: MavCmd, params: [f32; 7]) -> MavMessage {
    let [param1, param2, param3, param4, param5, param6, param7] = params;
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command,
        confirmation: 0,
        param1,
        param2,
        param3,
        param4,
        param5,
        param6,
        param7,
    })
}

/// Outbound mapping. Every command is exactly one message.
pub fn encode(cmd: &Command, target: Target) -> MavMessage {
    match cmd {
        Command::Arm => command_long(target, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        Command::Disarm => command_long(target, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7]),
        Command::Takeoff { altitude_m } => {
            command_long(target, MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, *altitude_m])
        }
        Command::Land => command_long(target, MavCmd::MAV_CMD_NAV_LAND, [0.0; 7]),
        Command::SetMode { mode } => {
            let flag = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
            command_long(target, MavCmd::MAV_CMD_DO_SET_MODE, [flag, mode.custom_mode() as f32, 0.0, 0.0, 0.0, 0.0, 0.0])
        }
        Command::Goto(p) => MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
            time_boot_ms: 0,
            x: p.x as f32,
            y: p.y as f32,
            z: p.z as f32,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: 0.0,
            type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_ONLY_MASK),
            target_system: target.system,
            target_component: target.component,
            coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        }),
        Command::SetLed(led) => {
            let mut custom_bytes = [0u8; 24];
            custom_bytes[..3].copy_from_slice(&led.output_bytes());
            MavMessage::LED_CONTROL(LED_CONTROL_DATA {
                target_system: target.system,
                target_component: target.component,
                instance: 0,
                pattern: LED_PATTERN_CUSTOM,
                custom_len: 3,
                custom_bytes,
            })
        }
        Command::Heartbeat => MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }),
        #[allow(deprecated)]
        Command::RequestStreams { rate_hz } => MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
            req_message_rate: *rate_hz,
            target_system: target.system,
            target_component: target.component,
            req_stream_id: MAV_DATA_STREAM_ALL,
            start_stop: 1,
        }),
    }
}

fn c_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Every field of `msg` under its MAVLink name, untouched.
fn raw_fields(msg: &MavMessage) -> Map<String, Value> {
    match serde_json::to_value(msg) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => Map::new(),
        Err(e) => {
            warn!("fc link: cannot serialize {}: {}", msg.message_name(), e);
            Map::new()
        }
    }
}

/// The view the core acts on. Messages it does not interpret keep their name.
pub fn interpret(msg: &MavMessage) -> TelemetryKind {
    match msg {
        MavMessage::HEARTBEAT(hb) => TelemetryKind::Heartbeat {
            custom_mode: hb.custom_mode,
            base_mode: hb.base_mode.bits(),
            system_status: hb.system_status as u8,
            armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
        },
        MavMessage::ATTITUDE(a) => TelemetryKind::Attitude { roll: a.roll, pitch: a.pitch, yaw: a.yaw },
        // mV, cA and percent; sentinels mean unknown
        MavMessage::SYS_STATUS(s) => TelemetryKind::SysStatus {
            voltage_v: (s.voltage_battery != u16::MAX).then(|| s.voltage_battery as f32 / 1000.0),
            current_a: (s.current_battery != -1).then(|| s.current_battery as f32 / 100.0),
            remaining_pct: (0..=100).contains(&s.battery_remaining).then(|| s.battery_remaining as u8),
        },
        MavMessage::GLOBAL_POSITION_INT(g) => TelemetryKind::GlobalPosition {
            lat: g.lat as f64 / 1e7,
            lon: g.lon as f64 / 1e7,
            alt_m: g.alt as f32 / 1000.0,
            relative_alt_m: g.relative_alt as f32 / 1000.0,
        },
        MavMessage::LOCAL_POSITION_NED(p) => TelemetryKind::LocalPosition { x: p.x, y: p.y, z: p.z },
        MavMessage::STATUSTEXT(st) => TelemetryKind::StatusText {
            severity: format!("{:?}", st.severity).trim_start_matches("MAV_SEVERITY_").to_string(),
            text: c_str(&st.text),
        },
        MavMessage::TERRAIN_REPORT(t) => TelemetryKind::TerrainReport {
            lat: t.lat as f64 / 1e7,
            lon: t.lon as f64 / 1e7,
            terrain_height: t.terrain_height,
            current_height: t.current_height,
        },
        MavMessage::EKF_STATUS_REPORT(e) => TelemetryKind::EkfStatus { flags: e.flags.bits() },
        MavMessage::COMMAND_ACK(ack) => TelemetryKind::CommandAck {
            command: format!("{:?}", ack.command),
            result: format!("{:?}", ack.result),
        },
        other => TelemetryKind::Unknown { name: other.message_name().to_string() },
    }
}

/// Inbound mapping: the interpreted view plus the full message for relaying.
pub fn decode(msg: &MavMessage) -> Telemetry {
    Telemetry::new(interpret(msg), msg.message_name(), raw_fields(msg))
}

/// A real MAVLink connection (serial, TCP or UDP URL).
pub struct MavTransport {
    conn: Box<dyn MavConnection<MavMessage> + Send + Sync>,
    sys_id: u8,
    comp_id: u8,
    sequence: AtomicU8,
}

impl MavTransport {
    pub fn open(url: &str, sys_id: u8, comp_id: u8) -> Result<Self> {
        if let Some((dev, baud)) = parse_serial(url) {
            // quick validate device
            let _ = tokio_serial::new(dev, baud)
                .open_native_async()
                .with_context(|| format!("open autopilot serial device {}", dev))?;
        }
        let conn = mavlink::connect::<MavMessage>(url).with_context(|| format!("mavlink connect {}", url))?;
        info!("fc link: connected {}", url);
        Ok(Self { conn, sys_id, comp_id, sequence: AtomicU8::new(0) })
    }
}

impl Transport for MavTransport {
    fn send(&self, msg: &MavMessage) -> Result<(), LinkError> {
        let hdr = MavHeader {
            system_id: self.sys_id,
            component_id: self.comp_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.conn.send(&hdr, msg).map(|_| ()).map_err(|e| LinkError::Send {
            command: msg.message_name().to_string(),
            reason: e.to_string(),
        })
    }

    fn recv(&self) -> Result<MavMessage, LinkError> {
        match self.conn.recv() {
            Ok((_hdr, msg)) => Ok(msg),
            Err(MessageReadError::Io(e)) => Err(LinkError::Recv(e.to_string())),
            Err(e) => Err(LinkError::Parse(e.to_string())),
        }
    }
}

pub fn serial_url(dev: &str, baud: u32) -> String {
    format!("serial:{}:{}", dev, baud)
}

/// `serial:<dev>:<baud>` -> (dev, baud)
pub fn parse_serial(url: &str) -> Option<(&str, u32)> {
    let rest = url.strip_prefix("serial:")?;
    let (dev, baud) = rest.rsplit_once(':')?;
    Some((dev, baud.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_proto::{FlightMode, LedCommand, Ned, Rgb};
    use mavlink::ardupilotmega::{ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA, LOCAL_POSITION_NED_DATA, SYSTEM_TIME_DATA};

    const T: Target = Target { system: 1, component: 1 };

    #[test]
    fn arm_and_takeoff_are_command_long() {
        let MavMessage::COMMAND_LONG(arm) = encode(&Command::Arm, T) else { panic!("not COMMAND_LONG") };
        assert_eq!(arm.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
        assert_eq!(arm.param1, 1.0);

        let MavMessage::COMMAND_LONG(to) = encode(&Command::Takeoff { altitude_m: 2.5 }, T) else {
            panic!("not COMMAND_LONG")
        };
        assert_eq!(to.command, MavCmd::MAV_CMD_NAV_TAKEOFF);
        assert_eq!(to.param7, 2.5);
    }

    #[test]
    fn set_mode_carries_custom_mode() {
        let MavMessage::COMMAND_LONG(m) = encode(&Command::SetMode { mode: FlightMode::Guided }, T) else {
            panic!("not COMMAND_LONG")
        };
        assert_eq!(m.command, MavCmd::MAV_CMD_DO_SET_MODE);
        assert_eq!(m.param1, 1.0);
        assert_eq!(m.param2, 4.0);
    }

    #[test]
    fn goto_is_position_only_local_ned() {
        let MavMessage::SET_POSITION_TARGET_LOCAL_NED(sp) = encode(&Command::Goto(Ned::new(1.0, -2.0, -3.0)), T) else {
            panic!("not SET_POSITION_TARGET_LOCAL_NED")
        };
        assert_eq!((sp.x, sp.y, sp.z), (1.0, -2.0, -3.0));
        assert_eq!(sp.type_mask.bits(), POSITION_ONLY_MASK);
        assert_eq!(sp.coordinate_frame, MavFrame::MAV_FRAME_LOCAL_NED);
    }

    #[test]
    fn led_bytes_are_scaled_and_zero_when_off() {
        let MavMessage::LED_CONTROL(on) = encode(&Command::SetLed(LedCommand::on(Rgb::RED, 0.5)), T) else {
            panic!("not LED_CONTROL")
        };
        assert_eq!(on.pattern, LED_PATTERN_CUSTOM);
        assert_eq!(&on.custom_bytes[..3], &[128, 0, 0]);

        let MavMessage::LED_CONTROL(off) = encode(&Command::SetLed(LedCommand::OFF), T) else {
            panic!("not LED_CONTROL")
        };
        assert_eq!(&off.custom_bytes[..3], &[0, 0, 0]);
    }

    #[test]
    fn decodes_heartbeat_and_position() {
        let hb = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 4,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        });
        match decode(&hb).kind {
            TelemetryKind::Heartbeat { custom_mode, armed, .. } => {
                assert_eq!(FlightMode::from_custom_mode(custom_mode), FlightMode::Guided);
                assert!(armed);
            }
            other => panic!("unexpected {:?}", other),
        }

        let pos = MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA {
            time_boot_ms: 10,
            x: 1.0,
            y: 2.0,
            z: -3.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
        });
        assert_eq!(decode(&pos).kind, TelemetryKind::LocalPosition { x: 1.0, y: 2.0, z: -3.0 });
    }

    #[test]
    fn relayed_record_keeps_every_field_unrenamed() {
        let msg = MavMessage::ATTITUDE(ATTITUDE_DATA {
            time_boot_ms: 5,
            roll: 0.1,
            pitch: 0.2,
            yaw: 0.3,
            rollspeed: 0.7,
            pitchspeed: 0.8,
            yawspeed: 0.9,
        });
        let v = serde_json::to_value(decode(&msg)).unwrap();
        assert_eq!(v["type"], "ATTITUDE");
        assert_eq!(v["time_boot_ms"], 5);
        for (key, want) in [("roll", 0.1f32), ("rollspeed", 0.7), ("pitchspeed", 0.8), ("yawspeed", 0.9)] {
            assert_eq!(v[key].as_f64().map(|x| x as f32), Some(want), "{}", key);
        }

        // raw units stay raw on the wire; only the interpreted view converts
        let gps = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            time_boot_ms: 9,
            lat: 473_977_420,
            lon: 85_455_940,
            alt: 12_000,
            relative_alt: 3_000,
            vx: 1,
            vy: 2,
            vz: 3,
            hdg: 9_000,
        });
        let t = decode(&gps);
        assert!(matches!(t.kind, TelemetryKind::GlobalPosition { relative_alt_m, .. } if relative_alt_m == 3.0));
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["alt"], 12_000);
        assert_eq!(v["hdg"], 9_000);
        assert_eq!(v["vz"], 3);
        assert!(v.get("alt_m").is_none());
    }

    #[test]
    fn uninterpreted_message_is_relayed_whole() {
        let msg = MavMessage::SYSTEM_TIME(SYSTEM_TIME_DATA { time_unix_usec: 123_456, time_boot_ms: 7 });
        let t = decode(&msg);
        assert_eq!(t.kind, TelemetryKind::Unknown { name: "SYSTEM_TIME".into() });
        assert_eq!(t.name(), "SYSTEM_TIME");

        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["type"], "SYSTEM_TIME");
        assert_eq!(v["time_unix_usec"], 123_456);
        assert_eq!(v["time_boot_ms"], 7);
    }

    #[test]
    fn serial_urls() {
        assert_eq!(parse_serial("serial:/dev/ttyUSB0:57600"), Some(("/dev/ttyUSB0", 57600)));
        assert_eq!(parse_serial("tcpout:127.0.0.1:5760"), None);
        assert_eq!(serial_url("/dev/ttyACM0", 115200), "serial:/dev/ttyACM0:115200");
    }
}
