use canvas_proto::{LedCommand, Ned, Rgb};
use serde::{Deserialize, Serialize};

use crate::error::PathError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Ned,
    pub color: Rgb,
    pub brightness: f32,
    pub segment_id: u32,
    /// Overrides the configured hold time for this waypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time_s: Option<f64>,
}

impl Waypoint {
    pub fn new(position: Ned, color: Rgb, brightness: f32, segment_id: u32) -> Self {
        Self { position, color, brightness, segment_id, hold_time_s: None }
    }

    pub fn with_hold_time(mut self, seconds: f64) -> Self {
        self.hold_time_s = Some(seconds);
        self
    }

    /// Full color/brightness of this waypoint, lit.
    pub fn led(&self) -> LedCommand {
        LedCommand::on(self.color, self.brightness)
    }
}

/// Ordered waypoints. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    waypoints: Vec<Waypoint>,
}

impl Path {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    /// Build and validate in one step.
    pub fn checked(waypoints: Vec<Waypoint>) -> Result<Self, PathError> {
        let path = Self::new(waypoints);
        path.validate()?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), PathError> {
        if self.waypoints.is_empty() {
            return Err(PathError::Empty);
        }
        for (index, wp) in self.waypoints.iter().enumerate() {
            let p = &wp.position;
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(PathError::NonFinite { index, field: "position" });
            }
            let c = &wp.color;
            if !(c.r.is_finite() && c.g.is_finite() && c.b.is_finite()) {
                return Err(PathError::NonFinite { index, field: "color" });
            }
            if !(0.0..=1.0).contains(&wp.brightness) {
                return Err(PathError::Brightness { index, value: wp.brightness });
            }
            if let Some(h) = wp.hold_time_s {
                if !(h >= 0.0) {
                    return Err(PathError::HoldTime { index, value: h });
                }
            }
        }
        Ok(())
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Number of contiguous strokes (runs of equal segment id).
    pub fn stroke_count(&self) -> usize {
        self.waypoints
            .iter()
            .enumerate()
            .filter(|(i, wp)| *i == 0 || self.waypoints[i - 1].segment_id != wp.segment_id)
            .count()
    }
}

impl FromIterator<Waypoint> for Path {
    fn from_iter<I: IntoIterator<Item = Waypoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
