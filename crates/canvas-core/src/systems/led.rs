use std::sync::{Arc, Mutex};

use canvas_proto::{Command, EventKind, LedCommand};
use tracing::debug;

use crate::error::SystemError;
use crate::scheduler::{System, TickContext};

/// Where the LED value ends up: a hardware driver, a visualizer, a log.
pub trait LedSink: Send {
    fn render(&mut self, led: &LedCommand) -> Result<(), SystemError>;
}

/// Logs changes only.
#[derive(Debug, Default)]
pub struct TracingLedSink {
    last: Option<LedCommand>,
}

impl LedSink for TracingLedSink {
    fn render(&mut self, led: &LedCommand) -> Result<(), SystemError> {
        if self.last.as_ref() != Some(led) {
            let [r, g, b] = led.output_bytes();
            debug!("led: on={} rgb=({}, {}, {})", led.on, r, g, b);
            self.last = Some(*led);
        }
        Ok(())
    }
}

/// Records every rendered frame; cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedSink {
    frames: Arc<Mutex<Vec<LedCommand>>>,
}

impl MemoryLedSink {
    pub fn frames(&self) -> Vec<LedCommand> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl LedSink for MemoryLedSink {
    fn render(&mut self, led: &LedCommand) -> Result<(), SystemError> {
        self.frames
            .lock()
            .map_err(|_| SystemError::Other("led frame buffer poisoned".into()))?
            .push(*led);
        Ok(())
    }
}

/// Renders the current LED command every tick. Publishes and (optionally)
/// forwards to the vehicle only when the value changes. A pending lift is
/// rendered as OFF first, so a stroke break is never skipped when the waypoint
/// system ticks faster than this one.
pub struct LedSystem {
    sink: Box<dyn LedSink>,
    forward_to_vehicle: bool,
    last: Option<LedCommand>,
}

impl LedSystem {
    pub fn new(sink: Box<dyn LedSink>, forward_to_vehicle: bool) -> Self {
        Self { sink, forward_to_vehicle, last: None }
    }

    fn show(&mut self, ctx: &mut TickContext<'_>, led: LedCommand) -> Result<(), SystemError> {
        self.sink.render(&led)?;
        if self.last == Some(led) {
            return Ok(());
        }
        if self.forward_to_vehicle {
            ctx.commands.enqueue(Command::SetLed(led))?;
        }
        self.last = Some(led);
        ctx.state.led_applied = Some(led);
        ctx.events.publish(EventKind::LedChanged { led });
        Ok(())
    }
}

impl System for LedSystem {
    fn name(&self) -> &'static str {
        "led"
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError> {
        let led = ctx.state.led_command;
        if std::mem::take(&mut ctx.state.led_lift) && led != LedCommand::OFF {
            debug!("led: rendering missed lift");
            self.show(ctx, LedCommand::OFF)?;
        }
        self.show(ctx, led)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::queue::command_queue;
    use crate::state::VehicleState;
    use canvas_proto::Rgb;
    use std::time::Instant;

    #[test]
    fn renders_every_tick_but_forwards_changes_only() {
        let sink = MemoryLedSink::default();
        let mut sys = LedSystem::new(Box::new(sink.clone()), true);
        let (tx, mut rx) = command_queue(16);
        let events = EventBus::new(16);
        let mut sub = events.subscribe();
        let mut state = VehicleState::default();

        let lit = LedCommand::on(Rgb::GREEN, 0.8);
        for led in [lit, lit, LedCommand::OFF] {
            state.led_command = led;
            let mut ctx = TickContext { now: Instant::now(), state: &mut state, commands: &tx, events: &events };
            sys.tick(&mut ctx).unwrap();
        }

        assert_eq!(sink.frames(), vec![lit, lit, LedCommand::OFF]);
        assert_eq!(rx.drain(), vec![Command::SetLed(lit), Command::SetLed(LedCommand::OFF)]);
        assert_eq!(state.led_applied, Some(LedCommand::OFF));
        let changes = std::iter::from_fn(|| sub.try_recv().ok()).count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn pending_lift_renders_off_before_the_next_stroke() {
        let sink = MemoryLedSink::default();
        let mut sys = LedSystem::new(Box::new(sink.clone()), true);
        let (tx, mut rx) = command_queue(16);
        let events = EventBus::new(16);
        let mut state = VehicleState::default();

        let red = LedCommand::on(Rgb::RED, 1.0);
        let green = LedCommand::on(Rgb::GREEN, 1.0);
        // the waypoint system lifted and lit the next stroke between two LED ticks
        for (led, lift) in [(red, false), (green, true), (green, false)] {
            state.led_command = led;
            state.led_lift = lift;
            let mut ctx = TickContext { now: Instant::now(), state: &mut state, commands: &tx, events: &events };
            sys.tick(&mut ctx).unwrap();
        }

        assert!(!state.led_lift);
        assert_eq!(sink.frames(), vec![red, LedCommand::OFF, green, green]);
        assert_eq!(
            rx.drain(),
            vec![Command::SetLed(red), Command::SetLed(LedCommand::OFF), Command::SetLed(green)]
        );
    }
}
