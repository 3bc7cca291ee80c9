pub mod heartbeat;
pub mod led;
pub mod startup;
pub mod waypoint;

pub use heartbeat::HeartbeatSystem;
pub use led::{LedSink, LedSystem, MemoryLedSink, TracingLedSink};
pub use startup::{StartupSystem, TakeoffSystem, TakeoffTrigger};
pub use waypoint::{WaypointHandle, WaypointProgress, WaypointStatus, WaypointSystem};

use crate::config::CoreConfig;
use crate::scheduler::{Rate, Scheduler};

/// What a mission needs to drive the standard set.
#[derive(Debug, Clone)]
pub struct StandardHandles {
    pub waypoints: WaypointHandle,
    pub takeoff: TakeoffTrigger,
}

/// Register the standard system set. Invocation order within a tick is
/// startup, takeoff, heartbeat, waypoint, led, so the LED renders the same
/// tick's waypoint decision. Takeoff polls at the waypoint rate and stays idle
/// until the mission releases it.
pub fn register_standard(
    scheduler: &mut Scheduler,
    cfg: &CoreConfig,
    telemetry_rate_hz: u16,
    takeoff_alt_m: f32,
    sink: Box<dyn LedSink>,
) -> StandardHandles {
    scheduler.register(Box::new(StartupSystem::new(telemetry_rate_hz)), Rate::OneShot);
    let (takeoff_sys, takeoff) = TakeoffSystem::new(takeoff_alt_m);
    scheduler.register(Box::new(takeoff_sys), Rate::from_hz(cfg.scheduler.waypoint_hz));
    scheduler.register(Box::new(HeartbeatSystem::new()), Rate::from_hz(cfg.scheduler.heartbeat_hz));
    let (waypoints_sys, waypoints) = WaypointSystem::new(cfg.waypoints.clone());
    scheduler.register(Box::new(waypoints_sys), Rate::from_hz(cfg.scheduler.waypoint_hz));
    scheduler.register(
        Box::new(LedSystem::new(sink, cfg.led.forward_to_vehicle)),
        Rate::from_hz(cfg.scheduler.led_hz),
    );
    StandardHandles { waypoints, takeoff }
}
