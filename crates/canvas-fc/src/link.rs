use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use canvas_core::{CommandReceiver, EventBus, LinkError, SharedVehicleState};
use canvas_proto::{Command, EventKind, TelemetryKind};
use mavlink::ardupilotmega::MavMessage;
use tracing::{debug, error, info, warn};

use crate::mav::{decode, encode, Target};
use crate::status::LinkStatus;

/// Blocking message I/O with the autopilot. Implementations must be usable
/// from the reader and writer threads at once.
pub trait Transport: Send + Sync {
    fn send(&self, msg: &MavMessage) -> Result<(), LinkError>;
    /// Blocks until a message arrives. `LinkError::Closed` ends the reader.
    fn recv(&self) -> Result<MavMessage, LinkError>;
}

const RECV_RETRY: Duration = Duration::from_millis(25);

/// Reader and writer threads between the transport and the control core. The
/// tick loop never touches the transport directly.
pub struct LinkWorker {
    status: Arc<Mutex<LinkStatus>>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl LinkWorker {
    pub fn spawn(
        transport: Arc<dyn Transport>,
        target: Target,
        state: SharedVehicleState,
        events: EventBus,
        commands: CommandReceiver,
    ) -> Result<Self> {
        let status = Arc::new(Mutex::new(LinkStatus::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let (transport, status, stop, events) = (transport.clone(), status.clone(), stop.clone(), events.clone());
            std::thread::Builder::new()
                .name("fc-recv".into())
                .spawn(move || recv_loop(transport.as_ref(), &state, &events, &status, &stop))
                .context("spawn fc reader")?
        };
        let writer = {
            let (status, stop) = (status.clone(), stop.clone());
            std::thread::Builder::new()
                .name("fc-send".into())
                .spawn(move || send_loop(transport.as_ref(), target, commands, &events, &status, &stop))
                .context("spawn fc writer")?
        };
        info!("fc link: worker started");
        Ok(Self { status, stop, threads: vec![reader, writer] })
    }

    pub fn status(&self) -> LinkStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Ask both threads to finish. From here on the writer rejects instead of
    /// sending, and exits once every `CommandSender` is dropped; the reader
    /// exits after its current `recv`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for both threads and return the final bookkeeping.
    pub fn join(self) -> LinkStatus {
        for t in self.threads {
            if t.join().is_err() {
                error!("fc link: worker thread panicked");
            }
        }
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

fn update(status: &Mutex<LinkStatus>, f: impl FnOnce(&mut LinkStatus)) {
    if let Ok(mut s) = status.lock() {
        f(&mut s);
    }
}

fn recv_loop(
    transport: &dyn Transport,
    state: &SharedVehicleState,
    events: &EventBus,
    status: &Mutex<LinkStatus>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) {
        let msg = match transport.recv() {
            Ok(msg) => msg,
            Err(LinkError::Closed) => {
                info!("fc link: transport closed");
                break;
            }
            Err(e) => {
                debug!("fc link: recv: {}", e);
                update(status, |s| s.recv_errors += 1);
                std::thread::sleep(RECV_RETRY);
                continue;
            }
        };

        let now = Instant::now();
        let telemetry = decode(&msg);
        let heartbeat = matches!(telemetry.kind, TelemetryKind::Heartbeat { .. });
        if let Err(e) = state.write(|s| s.apply(telemetry.clone(), now)) {
            error!("fc link: cannot record telemetry: {}", e);
            break;
        }
        update(status, |s| {
            s.received += 1;
            s.last_msg = Some(telemetry.name().to_string());
            if heartbeat {
                if !s.connected {
                    info!("fc link: autopilot heartbeat seen");
                }
                s.connected = true;
                s.last_heartbeat = Some(now);
            }
        });
        events.publish(EventKind::Telemetry { telemetry });
    }
}

fn reject(events: &EventBus, status: &Mutex<LinkStatus>, command: Command, reason: String) {
    warn!("fc link: {} rejected: {}", command.label(), reason);
    update(status, |s| s.rejected += 1);
    events.publish(EventKind::CommandRejected { command, reason });
}

fn send_loop(
    transport: &dyn Transport,
    target: Target,
    mut commands: CommandReceiver,
    events: &EventBus,
    status: &Mutex<LinkStatus>,
    stop: &AtomicBool,
) {
    while let Some(cmd) = commands.blocking_dequeue() {
        // once stopping, nothing more goes out; whatever is still queued is reported
        if stop.load(Ordering::SeqCst) {
            reject(events, status, cmd, "link stopping".into());
            continue;
        }
        match transport.send(&encode(&cmd, target)) {
            Ok(()) => {
                debug!("fc link: sent {}", cmd.label());
                update(status, |s| s.sent += 1);
            }
            // not retried: the next tick produces a fresh command anyway
            Err(e) => reject(events, status, cmd, e.to_string()),
        }
    }
    debug!("fc link: writer done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::command_queue;
    use canvas_proto::FlightMode;
    use mavlink::ardupilotmega::{
        MavAutopilot, MavModeFlag, MavState, MavType, HEARTBEAT_DATA, LOCAL_POSITION_NED_DATA,
    };
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeTransport {
        inbound: Mutex<VecDeque<MavMessage>>,
        sent: Mutex<Vec<MavMessage>>,
        fail_sends: bool,
    }

    impl Transport for FakeTransport {
        fn send(&self, msg: &MavMessage) -> Result<(), LinkError> {
            if self.fail_sends {
                return Err(LinkError::Send { command: "fake".into(), reason: "unplugged".into() });
            }
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }

        fn recv(&self) -> Result<MavMessage, LinkError> {
            self.inbound.lock().unwrap().pop_front().ok_or(LinkError::Closed)
        }
    }

    fn heartbeat(armed: bool) -> MavMessage {
        let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
        if armed {
            base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 4,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    #[test]
    fn telemetry_lands_in_state_and_commands_go_out_in_order() {
        let fake = Arc::new(FakeTransport::default());
        fake.inbound.lock().unwrap().extend([
            heartbeat(true),
            MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA {
                time_boot_ms: 0,
                x: 1.0,
                y: 0.0,
                z: -2.0,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
            }),
        ]);
        let state = SharedVehicleState::new();
        let events = EventBus::new(64);
        let (tx, rx) = command_queue(8);
        tx.enqueue(Command::Arm).unwrap();
        tx.enqueue(Command::Land).unwrap();
        drop(tx);

        let worker = LinkWorker::spawn(fake.clone(), Target::default(), state.clone(), events, rx).unwrap();
        let status = worker.join();
        assert_eq!(status.received, 2);
        assert_eq!(status.sent, 2);
        assert!(status.connected);
        assert_eq!(status.last_msg.as_deref(), Some("LOCAL_POSITION_NED"));

        let s = state.snapshot().unwrap();
        assert!(s.armed);
        assert_eq!(s.mode, FlightMode::Guided);
        assert_eq!(s.local_position.map(|p| p.z), Some(-2.0));

        let sent = fake.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], MavMessage::COMMAND_LONG(c) if c.param1 == 1.0));
    }

    #[test]
    fn failed_send_is_reported_and_not_retried() {
        let fake = Arc::new(FakeTransport { fail_sends: true, ..Default::default() });
        let events = EventBus::new(64);
        let mut sub = events.subscribe();
        let (tx, rx) = command_queue(8);
        tx.enqueue(Command::Takeoff { altitude_m: 2.0 }).unwrap();
        drop(tx);

        let worker = LinkWorker::spawn(fake, Target::default(), SharedVehicleState::new(), events, rx).unwrap();
        let status = worker.join();
        assert_eq!(status.rejected, 1);
        assert_eq!(status.sent, 0);

        let rejected: Vec<Command> = std::iter::from_fn(|| sub.try_recv().ok())
            .filter_map(|e| match e.kind {
                EventKind::CommandRejected { command, .. } => Some(command),
                _ => None,
            })
            .collect();
        assert_eq!(rejected, vec![Command::Takeoff { altitude_m: 2.0 }]);
    }

    #[test]
    fn commands_after_stop_are_rejected_not_dropped() {
        let fake = Arc::new(FakeTransport::default());
        let events = EventBus::new(64);
        let mut sub = events.subscribe();
        let (tx, rx) = command_queue(8);

        let worker = LinkWorker::spawn(fake.clone(), Target::default(), SharedVehicleState::new(), events, rx).unwrap();
        worker.stop();
        tx.enqueue(Command::SetLed(canvas_proto::LedCommand::OFF)).unwrap();
        tx.enqueue(Command::Land).unwrap();
        drop(tx);

        let status = worker.join();
        assert_eq!(status.sent, 0);
        assert_eq!(status.rejected, 2);
        assert!(fake.sent.lock().unwrap().is_empty());

        let rejected: Vec<(Command, String)> = std::iter::from_fn(|| sub.try_recv().ok())
            .filter_map(|e| match e.kind {
                EventKind::CommandRejected { command, reason } => Some((command, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(
            rejected,
            vec![
                (Command::SetLed(canvas_proto::LedCommand::OFF), "link stopping".to_string()),
                (Command::Land, "link stopping".to_string()),
            ]
        );
    }
}
