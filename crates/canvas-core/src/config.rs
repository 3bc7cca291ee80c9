use serde::Deserialize;

use crate::blend::BlendMode;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub scheduler: SchedulerConfig,
    pub waypoints: WaypointConfig,
    pub led: LedConfig,
}

/// Per-System tick rates. A rate of 0 registers the System as one-shot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub heartbeat_hz: f64,
    pub waypoint_hz: f64,
    pub led_hz: f64,
    /// Upper bound on control-thread sleep between ticks.
    pub base_tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { heartbeat_hz: 1.0, waypoint_hz: 10.0, led_hz: 20.0, base_tick_ms: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    /// Meters.
    pub arrival_tolerance: f64,
    /// Default dwell at each waypoint, seconds. Waypoints may override.
    pub hold_time_s: f64,
    pub blend: BlendMode,
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self { arrival_tolerance: 0.25, hold_time_s: 1.0, blend: BlendMode::Linear }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// Also send `set_led` to the vehicle when the rendered value changes.
    pub forward_to_vehicle: bool,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self { forward_to_vehicle: true }
    }
}
