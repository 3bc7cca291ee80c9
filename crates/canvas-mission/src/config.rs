use canvas_proto::{Ned, Rgb};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Registered mission to fly.
    pub name: String,
    pub takeoff_alt_m: f32,
    /// Pattern anchor in local NED (down is negative up).
    pub center_ned: Ned,
    pub scale: f64,
    pub color: Rgb,
    pub brightness: f32,
    /// Points per side (square) or per turn (spiral).
    pub points: usize,
    pub spiral_turns: f64,
    /// Per-waypoint hold override; `None` uses `[waypoints].hold_time_s`.
    pub hold_time_s: Option<f64>,
    /// Wait for a healthy EKF before anything else.
    pub require_ekf: bool,
    pub ekf_timeout_s: f64,
    pub airborne_timeout_s: f64,
    pub path_timeout_s: f64,
    pub land_settle_s: f64,
    pub disarm_timeout_s: f64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            name: "square".into(),
            takeoff_alt_m: 3.0,
            center_ned: Ned::new(0.0, 0.0, -5.0),
            scale: 1.0,
            color: Rgb::WHITE,
            brightness: 1.0,
            points: 8,
            spiral_turns: 3.0,
            hold_time_s: None,
            require_ekf: false,
            ekf_timeout_s: 60.0,
            airborne_timeout_s: 30.0,
            path_timeout_s: 600.0,
            land_settle_s: 2.0,
            disarm_timeout_s: 30.0,
        }
    }
}
