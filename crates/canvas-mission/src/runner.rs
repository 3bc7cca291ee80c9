use std::time::Duration;

use canvas_core::MissionError;
use tracing::{error, info, warn};

use crate::config::MissionConfig;
use crate::context::MissionContext;
use crate::missions::Mission;

/// Share of the takeoff altitude that counts as airborne.
const AIRBORNE_FRACTION: f32 = 0.9;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

/// Flies a mission's plan: EKF gate, takeoff, paint the path, settle, land.
/// Any failure after planning lands the vehicle with the light off.
pub struct MissionRunner {
    ctx: MissionContext,
    cfg: MissionConfig,
}

impl MissionRunner {
    pub fn new(ctx: MissionContext, cfg: MissionConfig) -> Self {
        Self { ctx, cfg }
    }

    pub fn context(&mut self) -> &mut MissionContext {
        &mut self.ctx
    }

    pub async fn run(&mut self, mission: &dyn Mission) -> Result<(), MissionError> {
        let path = mission.plan(&self.cfg)?;
        info!("mission: {} planned {} waypoints ({} strokes)", mission.name(), path.len(), path.stroke_count());

        match self.script(path).await {
            Ok(()) => {
                info!("mission: {} complete", mission.name());
                Ok(())
            }
            Err(e) => {
                error!("mission: {} failed: {}", mission.name(), e);
                self.safety_fallback();
                Err(e)
            }
        }
    }

    async fn script(&mut self, path: canvas_core::Path) -> Result<(), MissionError> {
        if self.cfg.require_ekf {
            info!("mission: waiting for EKF");
            self.ctx.wait_until("ekf healthy", secs(self.cfg.ekf_timeout_s), |s| s.ekf_healthy()).await?;
        }
        self.wait_airborne().await?;

        self.ctx.waypoints().load(path)?;
        self.ctx.wait_until_path_completed(secs(self.cfg.path_timeout_s)).await?;

        self.ctx.sleep(secs(self.cfg.land_settle_s)).await?;
        self.ctx.waypoints().disable()?;
        info!("mission: landing");
        self.ctx.land()?;

        match self.ctx.wait_until("disarm", secs(self.cfg.disarm_timeout_s), |s| !s.armed).await {
            Err(MissionError::Timeout(_)) => {
                warn!("mission: still armed after landing, disarming");
                self.ctx.disarm()
            }
            other => other,
        }
    }

    /// Take off unless already up, then wait until armed and near the takeoff
    /// altitude. One arm+takeoff retry on timeout.
    async fn wait_airborne(&mut self) -> Result<(), MissionError> {
        let alt = self.cfg.takeoff_alt_m;
        let timeout = secs(self.cfg.airborne_timeout_s);
        let airborne = move |s: &canvas_core::VehicleState| s.armed && s.position.relative_alt_m >= alt * AIRBORNE_FRACTION;

        if self.ctx.vehicle().map(|s| airborne(&s))? {
            info!("mission: already airborne");
            return Ok(());
        }
        info!("mission: takeoff to {:.1}m", alt);
        self.ctx.request_takeoff(alt)?;

        match self.ctx.wait_until("airborne", timeout, airborne).await {
            Err(MissionError::Timeout(_)) => {
                warn!("mission: not airborne after {:?}, retrying arm and takeoff", timeout);
                self.ctx.arm()?;
                self.ctx.takeoff(alt)?;
                self.ctx.wait_until("airborne", timeout, airborne).await
            }
            other => other,
        }
    }

    /// Light off, then land. Best effort: each step is tried even if the previous failed.
    fn safety_fallback(&mut self) {
        warn!("mission: safety fallback (led off, land)");
        if let Err(e) = self.ctx.waypoints().disable() {
            error!("mission: fallback disable failed: {}", e);
        }
        if let Err(e) = self.ctx.land() {
            error!("mission: fallback land failed: {}", e);
        }
    }
}
