use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use canvas_proto::{Command, EventKind, LedCommand};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::abort::AbortSignal;
use crate::config::WaypointConfig;
use crate::error::{MissionError, PathError, SystemError};
use crate::path::{Path, Waypoint};
use crate::scheduler::{System, TickContext};

pub const NAME: &str = "waypoint";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaypointStatus {
    Idle,
    Active { index: usize, sub_progress: f64 },
    Completed,
    Disabled,
}

impl WaypointStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, WaypointStatus::Active { .. })
    }
}

/// Status plus the load generation it belongs to, so a waiter never mistakes
/// the previous path's `Completed` for its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointProgress {
    pub generation: u64,
    pub status: WaypointStatus,
}

enum Request {
    Load { path: Path, generation: u64 },
    Disable,
}

/// Mission-side control of the waypoint system. Never blocks the tick loop:
/// requests are picked up at the start of the next waypoint tick.
#[derive(Debug, Clone)]
pub struct WaypointHandle {
    requests: mpsc::UnboundedSender<Request>,
    progress: watch::Receiver<WaypointProgress>,
    generations: Arc<AtomicU64>,
    awaiting: u64,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Load { path, generation } => write!(f, "Load({} waypoints, gen {})", path.len(), generation),
            Request::Disable => write!(f, "Disable"),
        }
    }
}

impl WaypointHandle {
    /// Queue `path` for loading; later waits refer to this load.
    pub fn load(&mut self, path: Path) -> Result<u64, MissionError> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .send(Request::Load { path, generation })
            .map_err(|_| MissionError::SchedulerGone)?;
        self.awaiting = generation;
        Ok(generation)
    }

    pub fn disable(&self) -> Result<(), MissionError> {
        self.requests.send(Request::Disable).map_err(|_| MissionError::SchedulerGone)
    }

    pub fn status(&self) -> WaypointStatus {
        self.progress.borrow().status
    }

    pub fn progress(&self) -> WaypointProgress {
        *self.progress.borrow()
    }

    /// Resolves when the last loaded path completes. `Disabled` first is an error.
    pub async fn wait_until_completed(&mut self, abort: &mut AbortSignal) -> Result<(), MissionError> {
        self.wait(abort, |s| match s {
            WaypointStatus::Completed => Some(Ok(())),
            WaypointStatus::Disabled => Some(Err(MissionError::WaypointsDisabled)),
            _ => None,
        })
        .await
    }

    /// Resolves once the system stops driving the last loaded path, either by
    /// completing it or by being disabled.
    pub async fn wait_until_disabled(&mut self, abort: &mut AbortSignal) -> Result<(), MissionError> {
        self.wait(abort, |s| match s {
            WaypointStatus::Completed | WaypointStatus::Disabled => Some(Ok(())),
            _ => None,
        })
        .await
    }

    async fn wait(
        &mut self,
        abort: &mut AbortSignal,
        done: impl Fn(WaypointStatus) -> Option<Result<(), MissionError>>,
    ) -> Result<(), MissionError> {
        loop {
            let p = *self.progress.borrow_and_update();
            if p.generation >= self.awaiting {
                if let Some(result) = done(p.status) {
                    return result;
                }
            }
            tokio::select! {
                changed = self.progress.changed() => {
                    if changed.is_err() {
                        return Err(MissionError::SchedulerGone);
                    }
                }
                _ = abort.aborted() => return Err(MissionError::Aborted),
            }
        }
    }
}

/// Walks a Path: one goto per waypoint, arrival + hold, and a per-tick LED
/// target that blends along a segment and goes dark between segments.
pub struct WaypointSystem {
    cfg: WaypointConfig,
    path: Path,
    status: WaypointStatus,
    generation: u64,
    generations: Arc<AtomicU64>,
    /// Latched arrival time at the current index.
    arrived_at: Option<Instant>,
    goto_sent: Option<usize>,
    requests: mpsc::UnboundedReceiver<Request>,
    progress: watch::Sender<WaypointProgress>,
}

impl WaypointSystem {
    pub fn new(cfg: WaypointConfig) -> (Self, WaypointHandle) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let initial = WaypointProgress { generation: 0, status: WaypointStatus::Idle };
        let (progress_tx, progress_rx) = watch::channel(initial);
        let generations = Arc::new(AtomicU64::new(0));
        let system = Self {
            cfg,
            path: Path::default(),
            status: WaypointStatus::Idle,
            generation: 0,
            generations: generations.clone(),
            arrived_at: None,
            goto_sent: None,
            requests: req_rx,
            progress: progress_tx,
        };
        let handle = WaypointHandle {
            requests: req_tx,
            progress: progress_rx,
            generations,
            awaiting: 0,
        };
        (system, handle)
    }

    pub fn status(&self) -> WaypointStatus {
        self.status
    }

    /// Start over on `path`. An empty or malformed path goes straight to `Completed`.
    pub fn load(&mut self, path: Path) -> Result<(), PathError> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.load_generation(path, generation)
    }

    pub fn disable(&mut self) {
        if self.status != WaypointStatus::Disabled {
            info!("waypoint: disabled");
        }
        self.status = WaypointStatus::Disabled;
        self.arrived_at = None;
        self.publish();
    }

    fn load_generation(&mut self, path: Path, generation: u64) -> Result<(), PathError> {
        self.generation = generation;
        self.arrived_at = None;
        self.goto_sent = None;
        let checked = path.validate();
        self.path = path;
        self.status = match &checked {
            Ok(()) => {
                info!("waypoint: loaded {} waypoints ({} strokes)", self.path.len(), self.path.stroke_count());
                WaypointStatus::Active { index: 0, sub_progress: 0.0 }
            }
            Err(e) => {
                warn!("waypoint: rejected path: {}", e);
                WaypointStatus::Completed
            }
        };
        self.publish();
        checked
    }

    fn drain_requests(&mut self, ctx: &mut TickContext<'_>) -> Result<(), PathError> {
        let mut first_err = None;
        while let Ok(req) = self.requests.try_recv() {
            debug!("waypoint: request {:?}", req);
            match req {
                Request::Load { path, generation } => {
                    let len = path.len();
                    match self.load_generation(path, generation) {
                        Ok(()) => {
                            ctx.state.led_command = LedCommand::OFF;
                            ctx.events.publish(EventKind::PathLoaded { len });
                        }
                        Err(e) => {
                            first_err.get_or_insert(e);
                        }
                    }
                }
                Request::Disable => {
                    self.disable();
                    ctx.state.led_command = LedCommand::OFF;
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn publish(&self) {
        let next = WaypointProgress { generation: self.generation, status: self.status };
        self.progress.send_if_modified(|cur| {
            if *cur == next {
                false
            } else {
                *cur = next;
                true
            }
        });
    }

    fn hold_time(&self, wp: &Waypoint) -> Duration {
        Duration::from_secs_f64(wp.hold_time_s.unwrap_or(self.cfg.hold_time_s).max(0.0))
    }

    /// Fraction of the prev -> cur span covered, measured from prev.
    fn sub_progress(prev: &Waypoint, cur: &Waypoint, position: &canvas_proto::Ned) -> f64 {
        let span = prev.position.distance(&cur.position);
        if span <= f64::EPSILON {
            return 1.0;
        }
        (position.distance(&prev.position) / span).clamp(0.0, 1.0)
    }

    fn step(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError> {
        let WaypointStatus::Active { index, .. } = self.status else {
            return Ok(());
        };
        let Some(target) = self.path.get(index).cloned() else {
            self.status = WaypointStatus::Completed;
            return Ok(());
        };

        if self.goto_sent != Some(index) {
            ctx.commands.enqueue(Command::Goto(target.position))?;
            self.goto_sent = Some(index);
            debug!("waypoint: goto #{} {:?}", index, target.position);
        }

        let Some(position) = ctx.state.local_position else {
            return Ok(());
        };
        let prev = index.checked_sub(1).and_then(|i| self.path.get(i)).cloned();

        if self.arrived_at.is_none() && position.distance(&target.position) <= self.cfg.arrival_tolerance {
            info!("waypoint: reached #{}/{}", index + 1, self.path.len());
            self.arrived_at = Some(ctx.now);
            ctx.events.publish(EventKind::WaypointReached { index });
        }

        let Some(arrived_at) = self.arrived_at else {
            let sub_progress = prev.as_ref().map_or(0.0, |p| Self::sub_progress(p, &target, &position));
            ctx.state.led_command = match &prev {
                Some(p) if p.segment_id == target.segment_id => self.cfg.blend.blend(p, &target, sub_progress),
                _ => LedCommand::OFF,
            };
            self.status = WaypointStatus::Active { index, sub_progress };
            return Ok(());
        };

        ctx.state.led_command = target.led();
        self.status = WaypointStatus::Active { index, sub_progress: 1.0 };
        if ctx.now.saturating_duration_since(arrived_at) < self.hold_time(&target) {
            return Ok(());
        }
        self.advance(ctx, index)
    }

    fn advance(&mut self, ctx: &mut TickContext<'_>, index: usize) -> Result<(), SystemError> {
        let next = index + 1;
        self.arrived_at = None;
        let Some(upcoming) = self.path.get(next) else {
            info!("waypoint: path complete");
            self.status = WaypointStatus::Completed;
            ctx.events.publish(EventKind::PathCompleted);
            return Ok(());
        };
        let lift = self.path.waypoints()[index].segment_id != upcoming.segment_id;
        if lift {
            ctx.state.led_command = LedCommand::OFF;
            ctx.state.led_lift = true;
        }
        self.status = WaypointStatus::Active { index: next, sub_progress: 0.0 };
        ctx.commands.enqueue(Command::Goto(upcoming.position))?;
        self.goto_sent = Some(next);
        debug!("waypoint: advance to #{} (lift={})", next, lift);
        Ok(())
    }
}

impl System for WaypointSystem {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SystemError> {
        let loaded = self.drain_requests(ctx);
        let stepped = self.step(ctx);
        self.publish();
        loaded?;
        stepped
    }
}
