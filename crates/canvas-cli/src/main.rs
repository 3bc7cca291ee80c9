mod doctor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use canvas_core::systems::{register_standard, TracingLedSink};
use canvas_core::{abort_pair, command_queue, CoreConfig, EventBus, Scheduler, SharedVehicleState};
use canvas_fc::autodetect::{autodetect_fc, AutodetectResult};
use canvas_fc::mav::serial_url;
use canvas_fc::{LinkConfig, LinkWorker, MavTransport};
use canvas_mission::{MissionConfig, MissionContext, MissionRunner};
use canvas_proto::Event;

#[derive(Debug, Parser)]
#[command(name = "canvas", version, about = "SkyCanvas - light painting flight control")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config file.
    Doctor,
    /// Fly a mission until it finishes or Ctrl-C.
    Run {
        #[arg(long)]
        mission: Option<String>,
    },
    /// List built-in missions.
    Missions,
    /// Print a mission's planned path as JSON without flying.
    Plan {
        #[arg(long)]
        mission: Option<String>,
    },
    Fc {
        #[command(subcommand)]
        cmd: FcCmd,
    },
}

#[derive(Debug, Subcommand)]
enum FcCmd {
    /// Scan serial ports/bauds for MAVLink heartbeats.
    Autodetect,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    /// Used when RUST_LOG is unset.
    log_level: Option<String>,
    link: LinkConfig,
    #[serde(flatten)]
    core: CoreConfig,
    mission: MissionConfig,
    events: EventsCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct EventsCfg {
    /// Append every event as one JSON line.
    jsonl_path: Option<String>,
    capacity: usize,
}

impl Default for EventsCfg {
    fn default() -> Self {
        Self { jsonl_path: None, capacity: 1024 }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    match cli.cmd {
        Command::Doctor => doctor(&cfg),
        Command::Run { mission } => run(cfg, mission).await,
        Command::Missions => {
            for m in canvas_mission::registry() {
                println!("{:<8} {}", m.name(), m.describe());
            }
            Ok(())
        }
        Command::Plan { mission } => plan(&cfg, mission),
        Command::Fc { cmd: FcCmd::Autodetect } => {
            let res = autodetect_fc(&cfg.link);
            print_autodetect(&res);
            Ok(())
        }
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_scheduler(&cfg.core.scheduler)?;
    doctor::check_waypoints(&cfg.core.waypoints)?;
    doctor::check_link(&cfg.link)?;
    doctor::check_mission(&cfg.mission)?;
    if cfg.link.autodetect {
        info!("doctor: link autodetect enabled (OK)");
    }
    if !cfg.core.led.forward_to_vehicle {
        warn!("doctor: led.forward_to_vehicle=false, the light is only logged");
    }
    info!("doctor: OK");
    Ok(())
}

fn plan(cfg: &Config, mission: Option<String>) -> Result<()> {
    let name = mission.unwrap_or_else(|| cfg.mission.name.clone());
    let m = canvas_mission::find(&name)?;
    let path = m.plan(&cfg.mission).with_context(|| format!("plan {}", name))?;
    info!("plan: {} waypoints, {} strokes", path.len(), path.stroke_count());
    println!("{}", serde_json::to_string_pretty(&path)?);
    Ok(())
}

fn print_autodetect(res: &AutodetectResult) {
    if let Some((dev, baud)) = &res.chosen {
        println!("CHOSEN: {} @ {}", dev, baud);
    } else {
        println!("CHOSEN: none");
    }
    for p in &res.attempts {
        println!("try dev={} baud={} hb={} {}ms note={}", p.dev, p.baud, p.hb_seen, p.elapsed_ms, p.note);
    }
}

fn resolve_connection(link: &LinkConfig) -> Result<String> {
    if !link.autodetect {
        return Ok(link.connection.clone());
    }
    let res = autodetect_fc(link);
    match res.chosen {
        Some((dev, baud)) => Ok(serial_url(&dev, baud)),
        None => {
            print_autodetect(&res);
            anyhow::bail!("fc autodetect failed: no heartbeat found")
        }
    }
}

async fn run(cfg: Config, mission: Option<String>) -> Result<()> {
    let name = mission.unwrap_or_else(|| cfg.mission.name.clone());
    let mission = canvas_mission::find(&name)?;
    info!("run: mission {}", name);

    let url = resolve_connection(&cfg.link)?;
    let transport = Arc::new(MavTransport::open(&url, cfg.link.sys_id, cfg.link.comp_id).context("FC open")?);

    let state = SharedVehicleState::new();
    let events = EventBus::new(cfg.events.capacity);
    let (tx, rx) = command_queue(cfg.link.queue_capacity);

    let journal = cfg.events.jsonl_path.clone().map(|p| tokio::spawn(write_jsonl(p, events.subscribe())));

    let worker = LinkWorker::spawn(transport, cfg.link.target(), state.clone(), events.clone(), rx)?;

    let mut scheduler = Scheduler::new(
        state.clone(),
        tx.clone(),
        events.clone(),
        Duration::from_millis(cfg.link.link_timeout_ms),
    );
    let handles = register_standard(
        &mut scheduler,
        &cfg.core,
        cfg.link.telemetry_rate_hz,
        cfg.mission.takeoff_alt_m,
        Box::new(TracingLedSink::default()),
    );

    let (abort, signal) = abort_pair();
    let stop = Arc::new(AtomicBool::new(false));
    let base_tick = Duration::from_millis(cfg.core.scheduler.base_tick_ms);
    let control = {
        let (stop, abort) = (stop.clone(), abort.clone());
        std::thread::Builder::new()
            .name("control".into())
            .spawn(move || {
                if let Err(e) = scheduler.run(&stop, base_tick) {
                    error!("run: control loop halted: {}", e);
                    abort.abort();
                }
            })
            .context("spawn control thread")?
    };

    tokio::spawn({
        let abort = abort.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("run: Ctrl-C, aborting mission");
                abort.abort();
            }
        }
    });

    let ctx = MissionContext::new(tx, state, handles.waypoints, signal).with_takeoff(handles.takeoff);
    let mut runner = MissionRunner::new(ctx, cfg.mission.clone());
    let result = runner.run(mission.as_ref()).await;
    drop(runner);

    // let the control loop forward the last LED/land commands
    tokio::time::sleep(Duration::from_secs(1)).await;
    stop.store(true, Ordering::SeqCst);
    worker.stop();
    if tokio::task::spawn_blocking(move || control.join()).await.map(|j| j.is_err()).unwrap_or(true) {
        error!("run: control thread panicked");
    }

    let st = worker.status();
    info!(
        "run: link connected={} received={} sent={} rejected={} last_heartbeat_age={:?}",
        st.connected,
        st.received,
        st.sent,
        st.rejected,
        st.hb_age()
    );
    drop(events);
    if let Some(j) = journal {
        let _ = tokio::time::timeout(Duration::from_secs(1), j).await;
    }

    result.with_context(|| format!("mission {}", name))
}

/// JSON-lines consumer of the event bus. Lagging drops events, never blocks publishers.
async fn write_jsonl(path: String, mut rx: broadcast::Receiver<Event>) {
    let mut file = match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(f) => f,
        Err(e) => {
            error!("events: open {} failed: {}", path, e);
            return;
        }
    };
    info!("events: writing {}", path);
    loop {
        let ev = match rx.recv().await {
            Ok(ev) => ev,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("events: writer lagged, dropped {}", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let mut line = match serde_json::to_vec(&ev) {
            Ok(l) => l,
            Err(e) => {
                warn!("events: serialize failed: {}", e);
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = file.write_all(&line).await {
            error!("events: write failed: {}", e);
            break;
        }
    }
    let _ = file.flush().await;
}
