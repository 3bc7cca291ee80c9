use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use canvas_proto::EventKind;
use tracing::{debug, error, info, warn};

use crate::error::{StateError, SystemError};
use crate::events::EventBus;
use crate::queue::CommandSender;
use crate::state::{SharedVehicleState, VehicleState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rate {
    Hz(f64),
    /// Runs on the first tick, then retires.
    OneShot,
}

impl Rate {
    /// 0 (or anything non-positive) means one-shot.
    pub fn from_hz(hz: f64) -> Self {
        if hz > 0.0 && hz.is_finite() {
            Rate::Hz(hz)
        } else {
            Rate::OneShot
        }
    }

    fn period(&self) -> Option<Duration> {
        match self {
            Rate::Hz(hz) => Some(Duration::from_nanos((1e9 / hz).round().max(1.0) as u64)),
            Rate::OneShot => None,
        }
    }
}

/// What a System sees for the duration of one tick.
pub struct TickContext<'a> {
    pub now: Instant,
    pub state: &'a mut VehicleState,
    pub commands: &'a CommandSender,
    pub events: &'a EventBus,
}

/// A periodic or one-shot task. `tick` must return promptly; state that spans
/// ticks lives in the System itself.
pub trait System: Send {
    fn name(&self) -> &'static str;
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError>;
}

struct Slot {
    system: Box<dyn System>,
    period: Option<Duration>,
    next_due: Option<Instant>,
    runs: u64,
    retired: bool,
}

/// Ticks registered Systems at their own rates off one clock, in registration order.
pub struct Scheduler {
    slots: Vec<Slot>,
    state: SharedVehicleState,
    commands: CommandSender,
    events: EventBus,
    link_timeout: Duration,
    link_stalled: bool,
    started_at: Option<Instant>,
    halted: Option<StateError>,
}

impl Scheduler {
    pub fn new(state: SharedVehicleState, commands: CommandSender, events: EventBus, link_timeout: Duration) -> Self {
        Self {
            slots: Vec::new(),
            state,
            commands,
            events,
            link_timeout,
            link_stalled: false,
            started_at: None,
            halted: None,
        }
    }

    pub fn register(&mut self, system: Box<dyn System>, rate: Rate) {
        let rate = match rate {
            Rate::Hz(hz) => Rate::from_hz(hz),
            one_shot => one_shot,
        };
        info!("scheduler: register {} at {:?}", system.name(), rate);
        self.slots.push(Slot { system, period: rate.period(), next_due: None, runs: 0, retired: false });
    }

    pub fn state(&self) -> &SharedVehicleState {
        &self.state
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn halted(&self) -> Option<&StateError> {
        self.halted.as_ref()
    }

    pub fn link_stalled(&self) -> bool {
        self.link_stalled
    }

    /// Invocation count for the named System.
    pub fn runs(&self, name: &str) -> u64 {
        self.slots.iter().filter(|s| s.system.name() == name).map(|s| s.runs).sum()
    }

    /// Earliest instant any live System is due.
    pub fn next_due(&self) -> Option<Instant> {
        self.slots.iter().filter(|s| !s.retired).filter_map(|s| s.next_due).min()
    }

    /// Run every System due at `now` once. Returns how many ran. An `Err` means
    /// the scheduler halted; every later call returns the same error.
    pub fn tick(&mut self, now: Instant) -> Result<usize, StateError> {
        if let Some(e) = &self.halted {
            return Err(e.clone());
        }
        let started_at = *self.started_at.get_or_insert(now);
        let tick_ms = now.saturating_duration_since(started_at).as_millis() as u64;

        if let Err(e) = self.check_link(now, started_at) {
            return Err(self.halt(e));
        }

        let mut ran = 0;
        for i in 0..self.slots.len() {
            let slot = &self.slots[i];
            if slot.retired || slot.next_due.map_or(false, |due| due > now) {
                continue;
            }

            let result = {
                let slot = &mut self.slots[i];
                let commands = &self.commands;
                let events = &self.events;
                self.state.write(|state| {
                    let mut ctx = TickContext { now, state, commands, events };
                    slot.system.tick(&mut ctx)
                })
            };
            ran += 1;

            let name = self.slots[i].system.name();
            match result {
                Err(e) => return Err(self.halt(e)),
                Ok(Err(SystemError::State(e))) => {
                    error!("scheduler: {} fatal at t={}ms: {}", name, tick_ms, e);
                    return Err(self.halt(e));
                }
                Ok(Err(e)) => self.report(name, tick_ms, e),
                Ok(Ok(())) => {}
            }

            self.reschedule(i, now);
        }
        Ok(ran)
    }

    /// Drive `tick` off the wall clock until `should_stop` is set or a fatal error.
    pub fn run(&mut self, should_stop: &AtomicBool, base_tick: Duration) -> Result<(), StateError> {
        info!("scheduler: running {} systems", self.slots.len());
        while !should_stop.load(Ordering::SeqCst) {
            let now = Instant::now();
            self.tick(now)?;
            let wake = self.next_due().map_or(now + base_tick, |due| due.min(now + base_tick));
            std::thread::sleep(wake.saturating_duration_since(Instant::now()));
        }
        info!("scheduler: stopped");
        Ok(())
    }

    fn reschedule(&mut self, i: usize, now: Instant) {
        let slot = &mut self.slots[i];
        slot.runs += 1;
        let Some(period) = slot.period else {
            debug!("scheduler: {} one-shot done", slot.system.name());
            slot.retired = true;
            return;
        };
        let last_due = slot.next_due.unwrap_or(now);
        let mut next = last_due + period;
        if next <= now {
            // behind: skip the missed slots rather than running them back to back
            let behind = now.duration_since(next).as_nanos();
            let skipped = (behind / period.as_nanos()) as u64 + 1;
            next += Duration::from_nanos(period.as_nanos() as u64 * skipped);
            warn!("scheduler: {} fell behind, skipped {} ticks", slot.system.name(), skipped);
            self.events.publish(EventKind::TickDrift { system: slot.system.name().to_string(), skipped });
        }
        slot.next_due = Some(next);
    }

    fn report(&self, name: &'static str, tick_ms: u64, e: SystemError) {
        warn!("scheduler: {} tick failed at t={}ms: {}", name, tick_ms, e);
        if let SystemError::Overflow(o) = &e {
            self.events.publish(EventKind::CommandRejected { command: o.command.clone(), reason: e.to_string() });
        }
        self.events.publish(EventKind::SystemFault { system: name.to_string(), message: e.to_string() });
    }

    fn check_link(&mut self, now: Instant, started_at: Instant) -> Result<(), StateError> {
        let silence = self
            .state
            .read(|s| s.link_silence(now))?
            .unwrap_or_else(|| now.saturating_duration_since(started_at));
        let stalled = silence > self.link_timeout;
        if stalled && !self.link_stalled {
            warn!("scheduler: no telemetry for {}ms, link stalled", silence.as_millis());
            self.events.publish(EventKind::LinkStalled { silent_ms: silence.as_millis() as u64 });
        } else if !stalled && self.link_stalled {
            info!("scheduler: telemetry resumed");
            self.events.publish(EventKind::LinkRestored);
        }
        self.link_stalled = stalled;
        Ok(())
    }

    fn halt(&mut self, e: StateError) -> StateError {
        error!("scheduler: halting: {}", e);
        self.events.publish(EventKind::SchedulerHalted { reason: e.to_string() });
        self.halted = Some(e.clone());
        e
    }
}
