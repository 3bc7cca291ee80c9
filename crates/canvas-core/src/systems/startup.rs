use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use canvas_proto::{Command, FlightMode};
use tracing::info;

use crate::error::SystemError;
use crate::scheduler::{System, TickContext};

/// One-shot: ask for telemetry streams and switch to GUIDED.
#[derive(Debug)]
pub struct StartupSystem {
    telemetry_rate_hz: u16,
}

impl StartupSystem {
    pub fn new(telemetry_rate_hz: u16) -> Self {
        Self { telemetry_rate_hz }
    }
}

impl System for StartupSystem {
    fn name(&self) -> &'static str {
        "startup"
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError> {
        info!("startup: requesting streams at {} Hz, mode GUIDED", self.telemetry_rate_hz);
        ctx.commands.enqueue(Command::RequestStreams { rate_hz: self.telemetry_rate_hz })?;
        ctx.commands.enqueue(Command::SetMode { mode: FlightMode::Guided })?;
        Ok(())
    }
}

/// Releases a waiting `TakeoffSystem`. Clones share the same trigger.
#[derive(Debug, Clone, Default)]
pub struct TakeoffTrigger(Arc<AtomicBool>);

impl TakeoffTrigger {
    pub fn release(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fires once, after its trigger is released: GUIDED unless already in it,
/// arm unless already armed, then take off to `altitude_m`.
#[derive(Debug)]
pub struct TakeoffSystem {
    altitude_m: f32,
    trigger: TakeoffTrigger,
    fired: bool,
}

impl TakeoffSystem {
    pub fn new(altitude_m: f32) -> (Self, TakeoffTrigger) {
        let trigger = TakeoffTrigger::default();
        (Self { altitude_m, trigger: trigger.clone(), fired: false }, trigger)
    }
}

impl System for TakeoffSystem {
    fn name(&self) -> &'static str {
        "takeoff"
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError> {
        if self.fired || !self.trigger.is_released() {
            return Ok(());
        }
        self.fired = true;
        info!("takeoff: climb to {:.1}m (armed={}, mode={:?})", self.altitude_m, ctx.state.armed, ctx.state.mode);
        if ctx.state.mode != FlightMode::Guided {
            ctx.commands.enqueue(Command::SetMode { mode: FlightMode::Guided })?;
        }
        if !ctx.state.armed {
            ctx.commands.enqueue(Command::Arm)?;
        }
        ctx.commands.enqueue(Command::Takeoff { altitude_m: self.altitude_m })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::queue::command_queue;
    use crate::state::VehicleState;
    use std::time::Instant;

    #[test]
    fn takeoff_waits_for_release_and_skips_what_is_done() {
        let (mut sys, trigger) = TakeoffSystem::new(4.0);
        let (tx, mut rx) = command_queue(16);
        let events = EventBus::new(16);
        let mut state = VehicleState { mode: FlightMode::Guided, ..Default::default() };

        for release in [false, false, true, true] {
            if release {
                trigger.release();
            }
            let mut ctx = TickContext { now: Instant::now(), state: &mut state, commands: &tx, events: &events };
            sys.tick(&mut ctx).unwrap();
        }
        assert_eq!(rx.drain(), vec![Command::Arm, Command::Takeoff { altitude_m: 4.0 }]);
    }
}
