use std::io::{self, Read};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::ardupilotmega::MavMessage;
use mavlink::error::MessageReadError;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::LinkConfig;

/// Per-read timeout; bounds how long a silent port can hold a check.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
pub struct PortAttempt {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub attempts: Vec<PortAttempt>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 230400, 921600]
}

/// Scan the configured (or default) serial candidates.
pub fn autodetect_fc(cfg: &LinkConfig) -> AutodetectResult {
    let devs = cfg.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = cfg.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    autodetect_with(&devs, &bauds, Duration::from_millis(cfg.heartbeat_timeout_ms), check_serial)
}

/// First (dev, baud) where `check` sees a HEARTBEAT within `heartbeat_timeout`.
/// Devices are tried in order, each at every baud. `check` must release the
/// device before returning so the next baud can open it.
pub fn autodetect_with<F>(
    candidate_devs: &[String],
    candidate_bauds: &[u32],
    heartbeat_timeout: Duration,
    mut check: F,
) -> AutodetectResult
where
    F: FnMut(&str, u32, Duration) -> Result<bool>,
{
    let mut attempts = Vec::new();

    for dev in candidate_devs {
        for baud in candidate_bauds {
            let start = Instant::now();
            let (hb_seen, note) = match check(dev, *baud, heartbeat_timeout) {
                Ok(true) => (true, "heartbeat".to_string()),
                Ok(false) => (false, "no heartbeat".to_string()),
                Err(e) => {
                    warn!("fc autodetect check failed dev={} baud={} err={:#}", dev, baud, e);
                    (false, format!("open/connect failed: {:#}", e))
                }
            };
            attempts.push(PortAttempt {
                dev: dev.clone(),
                baud: *baud,
                hb_seen,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });
            if hb_seen {
                info!("fc autodetect: OK {} @ {}", dev, baud);
                return AutodetectResult { chosen: Some((dev.clone(), *baud)), attempts };
            }
        }
    }

    AutodetectResult { chosen: None, attempts }
}

/// Listen on `dev` at `baud` for up to `timeout`. The port is opened with a
/// short read timeout and closed when this returns.
pub fn check_serial(dev: &str, baud: u32, timeout: Duration) -> Result<bool> {
    let mut port = tokio_serial::new(dev, baud)
        .timeout(PORT_READ_TIMEOUT)
        .open()
        .with_context(|| format!("open serial device {} @ {}", dev, baud))?;
    Ok(heartbeat_within(&mut port, timeout))
}

/// Parse MAVLink v2 frames until a HEARTBEAT, end of stream or the deadline.
/// Read timeouts and corrupt frames are skipped.
fn heartbeat_within<R: Read>(reader: &mut R, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match mavlink::read_v2_msg::<MavMessage, _>(reader) {
            Ok((_, MavMessage::HEARTBEAT(_))) => return true,
            Ok(_) => {}
            Err(MessageReadError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return false,
            Err(e) => debug!("fc autodetect: {}", e),
        }
    }
    false
}
