use canvas_proto::led::lerp;
use canvas_proto::LedCommand;
use serde::{Deserialize, Serialize};

use crate::path::Waypoint;

/// How the LED moves between two waypoints of the same segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Linear,
    /// Keep the previous waypoint's light until arrival.
    Step,
    /// Use the target waypoint's light for the whole span.
    None,
}

impl BlendMode {
    pub fn blend(&self, prev: &Waypoint, cur: &Waypoint, progress: f64) -> LedCommand {
        let p = progress.clamp(0.0, 1.0);
        match self {
            BlendMode::Linear => {
                let t = p as f32;
                LedCommand {
                    color: prev.color.lerp(cur.color, t),
                    brightness: lerp(prev.brightness, cur.brightness, t),
                    on: true,
                }
            }
            BlendMode::Step if p < 1.0 => prev.led(),
            BlendMode::Step | BlendMode::None => cur.led(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_proto::{Ned, Rgb};

    fn pair() -> (Waypoint, Waypoint) {
        (
            Waypoint::new(Ned::new(0.0, 0.0, 0.0), Rgb::RED, 0.2, 1),
            Waypoint::new(Ned::new(1.0, 0.0, 0.0), Rgb::BLUE, 1.0, 1),
        )
    }

    #[test]
    fn linear_matches_formula() {
        let (a, b) = pair();
        for i in 0..=10 {
            let p = i as f64 / 10.0;
            let led = BlendMode::Linear.blend(&a, &b, p);
            let t = p as f32;
            assert!(led.on);
            assert_eq!(led.color.r, 1.0 * (1.0 - t) + 0.0 * t);
            assert_eq!(led.color.b, 0.0 * (1.0 - t) + 1.0 * t);
            assert_eq!(led.brightness, 0.2 * (1.0 - t) + 1.0 * t);
        }
    }

    #[test]
    fn linear_endpoints_are_exact() {
        let (a, b) = pair();
        assert_eq!(BlendMode::Linear.blend(&a, &b, 0.0), a.led());
        assert_eq!(BlendMode::Linear.blend(&a, &b, 1.0), b.led());
        assert_eq!(BlendMode::Linear.blend(&a, &b, 7.0), b.led());
    }

    #[test]
    fn step_and_none() {
        let (a, b) = pair();
        assert_eq!(BlendMode::Step.blend(&a, &b, 0.99), a.led());
        assert_eq!(BlendMode::Step.blend(&a, &b, 1.0), b.led());
        assert_eq!(BlendMode::None.blend(&a, &b, 0.0), b.led());
    }
}
