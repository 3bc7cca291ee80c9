use anyhow::Result;
use canvas_core::{SchedulerConfig, WaypointConfig};
use canvas_fc::mav::parse_serial;
use canvas_fc::LinkConfig;
use canvas_mission::MissionConfig;

pub fn check_scheduler(s: &SchedulerConfig) -> Result<()> {
    for (name, hz) in [("heartbeat_hz", s.heartbeat_hz), ("waypoint_hz", s.waypoint_hz), ("led_hz", s.led_hz)] {
        anyhow::ensure!(hz.is_finite() && hz > 0.0, "scheduler.{} must be > 0", name);
    }
    anyhow::ensure!(s.led_hz >= s.waypoint_hz, "scheduler.led_hz must be >= scheduler.waypoint_hz");
    anyhow::ensure!(s.base_tick_ms >= 1, "scheduler.base_tick_ms must be >= 1");
    Ok(())
}

pub fn check_waypoints(w: &WaypointConfig) -> Result<()> {
    anyhow::ensure!(w.arrival_tolerance.is_finite() && w.arrival_tolerance > 0.0, "waypoints.arrival_tolerance must be > 0");
    anyhow::ensure!(w.hold_time_s.is_finite() && w.hold_time_s >= 0.0, "waypoints.hold_time_s must be >= 0");
    Ok(())
}

pub fn check_link(l: &LinkConfig) -> Result<()> {
    if !l.autodetect {
        anyhow::ensure!(!l.connection.is_empty(), "link.connection missing (autodetect=false)");
        if l.connection.starts_with("serial:") {
            anyhow::ensure!(parse_serial(&l.connection).is_some(), "link.connection must be serial:<dev>:<baud>");
        }
    }
    anyhow::ensure!(l.queue_capacity > 0, "link.queue_capacity must be > 0");
    anyhow::ensure!(l.telemetry_rate_hz > 0, "link.telemetry_rate_hz must be > 0");
    anyhow::ensure!(l.link_timeout_ms > 0, "link.link_timeout_ms must be > 0");
    anyhow::ensure!(l.heartbeat_timeout_ms > 0, "link.heartbeat_timeout_ms must be > 0");
    Ok(())
}

pub fn check_mission(m: &MissionConfig) -> Result<()> {
    anyhow::ensure!(m.takeoff_alt_m.is_finite() && m.takeoff_alt_m > 0.0, "mission.takeoff_alt_m must be > 0");
    anyhow::ensure!(m.scale.is_finite() && m.scale > 0.0, "mission.scale must be > 0");
    anyhow::ensure!(m.points >= 1, "mission.points must be >= 1");
    let mission = canvas_mission::find(&m.name)?;
    mission.plan(m)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        check_scheduler(&SchedulerConfig::default()).unwrap();
        check_waypoints(&WaypointConfig::default()).unwrap();
        check_link(&LinkConfig::default()).unwrap();
        check_mission(&MissionConfig::default()).unwrap();
    }

    #[test]
    fn out_of_range_values_fail() {
        let w = WaypointConfig { arrival_tolerance: 0.0, ..Default::default() };
        assert!(check_waypoints(&w).is_err());
        let s = SchedulerConfig { led_hz: 0.0, ..Default::default() };
        assert!(check_scheduler(&s).unwrap_err().to_string().contains("led_hz"));
        let s = SchedulerConfig { waypoint_hz: 10.0, led_hz: 5.0, ..Default::default() };
        assert!(check_scheduler(&s).unwrap_err().to_string().contains("led_hz must be >= scheduler.waypoint_hz"));
        let l = LinkConfig { connection: "serial:/dev/ttyUSB0".into(), ..Default::default() };
        assert!(check_link(&l).is_err());
        let m = MissionConfig { name: "nope".into(), ..Default::default() };
        assert!(check_mission(&m).is_err());
    }
}
