use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use canvas_proto::{FlightMode, LedCommand, Ned, Telemetry, TelemetryKind};
use serde::Serialize;

use crate::error::StateError;

// EKF_STATUS_REPORT flag bits (ArduPilot EkfStatusFlags)
const EKF_ATTITUDE: u16 = 1;
const EKF_VELOCITY_HORIZ: u16 = 2;
const EKF_POS_HORIZ_REL: u16 = 8;
const EKF_POS_HORIZ_ABS: u16 = 16;
const EKF_POS_VERT_ABS: u16 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f32,
    pub relative_alt_m: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub voltage: Option<f32>,
    pub current: Option<f32>,
    pub remaining: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct TelemetryRecord {
    pub received_at: Instant,
    pub telemetry: Telemetry,
}

/// Last-known telemetry for one vehicle link plus the views derived from it.
#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    /// Latest message per name. No history.
    pub telemetry: HashMap<String, TelemetryRecord>,
    pub armed: bool,
    pub mode: FlightMode,
    pub position: GeoPosition,
    pub local_position: Option<Ned>,
    pub attitude: Attitude,
    pub battery: BatteryStatus,
    pub ekf_flags: Option<u16>,
    pub status_text: Option<String>,
    pub last_telemetry_at: Option<Instant>,
    /// Desired LED, written by the waypoint system.
    pub led_command: LedCommand,
    /// Set by the waypoint system on a lift; the LED system renders OFF once
    /// and clears it, whatever the two tick rates are.
    pub led_lift: bool,
    /// Last value the LED system rendered.
    pub led_applied: Option<LedCommand>,
}

impl VehicleState {
    pub fn apply(&mut self, telemetry: Telemetry, at: Instant) {
        match &telemetry.kind {
            TelemetryKind::Heartbeat { custom_mode, armed, .. } => {
                self.armed = *armed;
                self.mode = FlightMode::from_custom_mode(*custom_mode);
            }
            TelemetryKind::Attitude { roll, pitch, yaw } => {
                self.attitude = Attitude { roll: *roll, pitch: *pitch, yaw: *yaw };
            }
            TelemetryKind::SysStatus { voltage_v, current_a, remaining_pct } => {
                self.battery = BatteryStatus { voltage: *voltage_v, current: *current_a, remaining: *remaining_pct };
            }
            TelemetryKind::GlobalPosition { lat, lon, alt_m, relative_alt_m } => {
                self.position = GeoPosition { lat: *lat, lon: *lon, alt_m: *alt_m, relative_alt_m: *relative_alt_m };
            }
            TelemetryKind::LocalPosition { x, y, z } => {
                self.local_position = Some(Ned::new(*x as f64, *y as f64, *z as f64));
            }
            TelemetryKind::StatusText { text, .. } => {
                self.status_text = Some(text.clone());
            }
            TelemetryKind::EkfStatus { flags } => {
                self.ekf_flags = Some(*flags);
            }
            TelemetryKind::TerrainReport { .. } | TelemetryKind::CommandAck { .. } | TelemetryKind::Unknown { .. } => {}
        }
        self.last_telemetry_at = Some(at);
        self.telemetry
            .insert(telemetry.name().to_string(), TelemetryRecord { received_at: at, telemetry });
    }

    pub fn latest(&self, name: &str) -> Option<&Telemetry> {
        self.telemetry.get(name).map(|r| &r.telemetry)
    }

    /// Time since any telemetry arrived, if any ever did.
    pub fn link_silence(&self, now: Instant) -> Option<Duration> {
        self.last_telemetry_at.map(|t| now.saturating_duration_since(t))
    }

    /// Attitude, horizontal velocity, horizontal and vertical position all locked.
    pub fn ekf_healthy(&self) -> bool {
        let Some(f) = self.ekf_flags else { return false };
        let att_vel = EKF_ATTITUDE | EKF_VELOCITY_HORIZ;
        f & att_vel == att_vel
            && f & (EKF_POS_HORIZ_REL | EKF_POS_HORIZ_ABS) != 0
            && f & EKF_POS_VERT_ABS != 0
    }
}

thread_local! {
    static WRITING: Cell<bool> = const { Cell::new(false) };
}

struct WriteMark;

impl WriteMark {
    fn enter() -> Result<Self, StateError> {
        if WRITING.with(|w| w.replace(true)) {
            return Err(StateError::Reentrant);
        }
        Ok(WriteMark)
    }
}

impl Drop for WriteMark {
    fn drop(&mut self) {
        WRITING.with(|w| w.set(false));
    }
}

/// VehicleState behind a reader/writer lock. Borrows are scoped to a closure so
/// nobody can hold a reference past the call.
#[derive(Debug, Clone, Default)]
pub struct SharedVehicleState {
    inner: Arc<RwLock<VehicleState>>,
}

impl SharedVehicleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&VehicleState) -> R) -> Result<R, StateError> {
        let guard = self.inner.read().map_err(|_| StateError::Poisoned)?;
        Ok(f(&guard))
    }

    /// Exclusive borrow. Re-entering from inside another write on the same
    /// thread is a `StateError::Reentrant` instead of a deadlock.
    pub fn write<R>(&self, f: impl FnOnce(&mut VehicleState) -> R) -> Result<R, StateError> {
        let _mark = WriteMark::enter()?;
        let mut guard = self.inner.write().map_err(|_| StateError::Poisoned)?;
        Ok(f(&mut guard))
    }

    pub fn snapshot(&self) -> Result<VehicleState, StateError> {
        self.read(|s| s.clone())
    }
}
