use std::time::Duration;

use canvas_core::systems::{TakeoffTrigger, WaypointHandle};
use canvas_core::{AbortSignal, CommandSender, MissionError, SharedVehicleState, VehicleState};
use canvas_proto::{Command, FlightMode};
use tracing::debug;

const POLL: Duration = Duration::from_millis(50);

/// Everything a mission may touch. Commands go through the queue like any
/// System's; vehicle state is only ever read in short closures.
pub struct MissionContext {
    commands: CommandSender,
    state: SharedVehicleState,
    waypoints: WaypointHandle,
    takeoff: Option<TakeoffTrigger>,
    abort: AbortSignal,
    poll: Duration,
}

impl MissionContext {
    pub fn new(commands: CommandSender, state: SharedVehicleState, waypoints: WaypointHandle, abort: AbortSignal) -> Self {
        Self { commands, state, waypoints, takeoff: None, abort, poll: POLL }
    }

    /// Leave the first takeoff to a registered `TakeoffSystem`.
    pub fn with_takeoff(mut self, trigger: TakeoffTrigger) -> Self {
        self.takeoff = Some(trigger);
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn send(&self, command: Command) -> Result<(), MissionError> {
        debug!("mission: {}", command.label());
        Ok(self.commands.enqueue(command)?)
    }

    pub fn arm(&self) -> Result<(), MissionError> {
        self.send(Command::Arm)
    }

    pub fn disarm(&self) -> Result<(), MissionError> {
        self.send(Command::Disarm)
    }

    pub fn takeoff(&self, altitude_m: f32) -> Result<(), MissionError> {
        self.send(Command::Takeoff { altitude_m })
    }

    /// Release the takeoff system if one is wired; otherwise issue whatever the
    /// vehicle still needs (GUIDED, arm) followed by takeoff.
    pub fn request_takeoff(&self, altitude_m: f32) -> Result<(), MissionError> {
        if let Some(trigger) = &self.takeoff {
            debug!("mission: releasing takeoff");
            trigger.release();
            return Ok(());
        }
        let (mode, armed) = self.state.read(|s| (s.mode, s.armed))?;
        if mode != FlightMode::Guided {
            self.set_mode(FlightMode::Guided)?;
        }
        if !armed {
            self.arm()?;
        }
        self.takeoff(altitude_m)
    }

    pub fn land(&self) -> Result<(), MissionError> {
        self.send(Command::Land)
    }

    pub fn set_mode(&self, mode: FlightMode) -> Result<(), MissionError> {
        self.send(Command::SetMode { mode })
    }

    pub fn vehicle(&self) -> Result<VehicleState, MissionError> {
        Ok(self.state.snapshot()?)
    }

    pub fn waypoints(&mut self) -> &mut WaypointHandle {
        &mut self.waypoints
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub async fn sleep(&mut self, d: Duration) -> Result<(), MissionError> {
        tokio::select! {
            _ = tokio::time::sleep(d) => Ok(()),
            _ = self.abort.aborted() => Err(MissionError::Aborted),
        }
    }

    /// Poll `pred` against the vehicle state until it holds, `timeout` passes
    /// (`MissionError::Timeout(what)`) or the mission is aborted.
    pub async fn wait_until(
        &mut self,
        what: &str,
        timeout: Duration,
        pred: impl Fn(&VehicleState) -> bool,
    ) -> Result<(), MissionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.abort.is_aborted() {
                return Err(MissionError::Aborted);
            }
            if self.state.read(&pred)? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MissionError::Timeout(what.to_string()));
            }
            let poll = self.poll;
            self.sleep(poll).await?;
        }
    }

    pub async fn wait_until_path_completed(&mut self, timeout: Duration) -> Result<(), MissionError> {
        let Self { waypoints, abort, .. } = self;
        tokio::time::timeout(timeout, waypoints.wait_until_completed(abort))
            .await
            .map_err(|_| MissionError::Timeout("path completion".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::systems::WaypointSystem;
    use canvas_core::{abort_pair, command_queue, WaypointConfig};

    #[tokio::test]
    async fn wait_until_times_out_then_succeeds() {
        let state = SharedVehicleState::new();
        let (tx, mut rx) = command_queue(8);
        let (_sys, handle) = WaypointSystem::new(WaypointConfig::default());
        let (_abort, signal) = abort_pair();
        let mut ctx = MissionContext::new(tx, state.clone(), handle, signal).with_poll_interval(Duration::from_millis(5));

        let armed = ctx.wait_until("armed", Duration::from_millis(20), |s| s.armed).await;
        assert!(matches!(armed, Err(MissionError::Timeout(w)) if w == "armed"));

        state.write(|s| s.armed = true).unwrap();
        ctx.wait_until("armed", Duration::from_millis(20), |s| s.armed).await.unwrap();

        ctx.arm().unwrap();
        ctx.set_mode(FlightMode::Guided).unwrap();
        assert_eq!(rx.drain(), vec![Command::Arm, Command::SetMode { mode: FlightMode::Guided }]);
    }

    #[tokio::test]
    async fn abort_interrupts_sleep() {
        let (tx, _rx) = command_queue(8);
        let (_sys, handle) = WaypointSystem::new(WaypointConfig::default());
        let (abort, signal) = abort_pair();
        let mut ctx = MissionContext::new(tx, SharedVehicleState::new(), handle, signal);
        abort.abort();
        assert!(matches!(ctx.sleep(Duration::from_secs(60)).await, Err(MissionError::Aborted)));
        assert!(ctx.is_aborted());
    }

    #[tokio::test]
    async fn request_takeoff_releases_trigger_or_issues_commands() {
        let state = SharedVehicleState::new();
        let (tx, mut rx) = command_queue(8);
        let (_sys, handle) = WaypointSystem::new(WaypointConfig::default());
        let (_abort, signal) = abort_pair();
        let (_takeoff, trigger) = canvas_core::systems::TakeoffSystem::new(2.0);

        let wired = MissionContext::new(tx.clone(), state.clone(), handle.clone(), signal.clone()).with_takeoff(trigger.clone());
        wired.request_takeoff(2.0).unwrap();
        assert!(trigger.is_released());
        assert!(rx.drain().is_empty());

        state.write(|s| s.mode = FlightMode::Guided).unwrap();
        let direct = MissionContext::new(tx, state, handle, signal);
        direct.request_takeoff(2.0).unwrap();
        assert_eq!(rx.drain(), vec![Command::Arm, Command::Takeoff { altitude_m: 2.0 }]);
    }
}
