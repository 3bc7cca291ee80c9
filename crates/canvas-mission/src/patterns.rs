//! Path generators. Every pattern is placed relative to `center_ned` and sized by `scale`.

use std::f64::consts::TAU;

use canvas_core::{Path, PathError, Waypoint};
use canvas_proto::{Ned, Rgb};

use crate::config::MissionConfig;

/// Side length of the unit square, meters.
const SQUARE_SIZE: f64 = 4.0;
const SPIRAL_RADIUS: f64 = 1.5;
const SPIRAL_RISE: f64 = 4.0;
/// Fraction of each side left dark at both ends of a dashed square.
const DASH_GAP: f64 = 0.15;

// smiley geometry at scale 1, meters
const FACE_RADIUS: f64 = 2.3;
const FACE_POINTS: usize = 24;
const EYE_RADIUS: f64 = 0.3;
const EYE_POINTS: usize = 8;
/// Eye centers: north offset either side, and height above center.
const EYE_OFFSET: (f64, f64) = (0.8, 1.3);
const SMILE_RADIUS: f64 = 1.2;
/// Smile arc center sits this far below the face center.
const SMILE_DROP: f64 = 0.3;
const SMILE_POINTS: usize = 16;

fn waypoint(cfg: &MissionConfig, position: Ned, color: Rgb, brightness: f32, segment_id: u32) -> Waypoint {
    let wp = Waypoint::new(position, color, brightness, segment_id);
    match cfg.hold_time_s {
        Some(h) => wp.with_hold_time(h),
        None => wp,
    }
}

/// Full saturation/value hue wheel, `hue` in turns.
pub fn hue(hue: f64) -> Rgb {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = (1.0 - ((h % 2.0) - 1.0).abs()) as f32;
    match h as u32 {
        0 => Rgb::new(1.0, x, 0.0),
        1 => Rgb::new(x, 1.0, 0.0),
        2 => Rgb::new(0.0, 1.0, x),
        3 => Rgb::new(0.0, x, 1.0),
        4 => Rgb::new(x, 0.0, 1.0),
        _ => Rgb::new(1.0, 0.0, x),
    }
}

/// One point at the center.
pub fn hop(cfg: &MissionConfig) -> Result<Path, PathError> {
    Path::checked(vec![waypoint(cfg, cfg.center_ned, cfg.color, cfg.brightness, 0)])
}

/// Corners in the North-Down plane, clockwise from top-left as seen from the east.
fn corners(cfg: &MissionConfig) -> [Ned; 4] {
    let c = cfg.center_ned;
    let h = SQUARE_SIZE * cfg.scale / 2.0;
    [
        Ned::new(c.x - h, c.y, c.z - h),
        Ned::new(c.x + h, c.y, c.z - h),
        Ned::new(c.x + h, c.y, c.z + h),
        Ned::new(c.x - h, c.y, c.z + h),
    ]
}

fn along(a: &Ned, b: &Ned, t: f64) -> Ned {
    Ned::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t, a.z + (b.z - a.z) * t)
}

/// Closed square, one stroke, `points` waypoints per side.
pub fn square(cfg: &MissionConfig) -> Result<Path, PathError> {
    let corners = corners(cfg);
    let per_side = cfg.points.max(1);
    let mut wps = Vec::with_capacity(per_side * 4 + 1);
    for side in 0..4 {
        let (a, b) = (&corners[side], &corners[(side + 1) % 4]);
        for j in 0..per_side {
            let t = j as f64 / per_side as f64;
            wps.push(waypoint(cfg, along(a, b, t), cfg.color, cfg.brightness, 0));
        }
    }
    wps.push(waypoint(cfg, corners[0], cfg.color, cfg.brightness, 0));
    Path::checked(wps)
}

/// Square with each side its own stroke and dark corners; side colors walk the hue wheel.
pub fn dashed_square(cfg: &MissionConfig) -> Result<Path, PathError> {
    let corners = corners(cfg);
    let mut wps = Vec::with_capacity(8);
    for side in 0..4 {
        let (a, b) = (&corners[side], &corners[(side + 1) % 4]);
        let color = hue(side as f64 / 4.0);
        let seg = side as u32 + 1;
        wps.push(waypoint(cfg, along(a, b, DASH_GAP), color, cfg.brightness, seg));
        wps.push(waypoint(cfg, along(a, b, 1.0 - DASH_GAP), color, cfg.brightness, seg));
    }
    Path::checked(wps)
}

/// Helix rising from the center: circles in the North-East plane, hue over
/// the full wheel, brightness ramping up to the configured value.
pub fn spiral(cfg: &MissionConfig) -> Result<Path, PathError> {
    let c = cfg.center_ned;
    let total = ((cfg.spiral_turns * cfg.points.max(1) as f64).round() as usize).max(2);
    let radius = SPIRAL_RADIUS * cfg.scale;
    let rise = SPIRAL_RISE * cfg.scale;
    let wps = (0..total)
        .map(|i| {
            let t = i as f64 / (total - 1) as f64;
            let angle = t * cfg.spiral_turns * TAU;
            let position = Ned::new(c.x + radius * angle.cos(), c.y + radius * angle.sin(), c.z - t * rise);
            let brightness = cfg.brightness * (0.2 + 0.8 * t as f32);
            waypoint(cfg, position, hue(t), brightness, 0)
        })
        .collect();
    Path::checked(wps)
}

/// `n` points around a circle in the North-Down plane, closed back on the first.
fn ring(cfg: &MissionConfig, center: Ned, radius: f64, n: usize, color: Rgb, segment_id: u32) -> Vec<Waypoint> {
    (0..=n)
        .map(|i| {
            let angle = (i % n) as f64 / n as f64 * TAU;
            let position = Ned::new(center.x + radius * angle.cos(), center.y, center.z + radius * angle.sin());
            waypoint(cfg, position, color, cfg.brightness, segment_id)
        })
        .collect()
}

/// Face outline, two eyes and a smile in the North-Down plane. Each feature
/// is its own stroke: yellow face, blue eyes, red smile.
pub fn smiley(cfg: &MissionConfig) -> Result<Path, PathError> {
    let c = cfg.center_ned;
    let k = cfg.scale;
    let yellow = Rgb::new(1.0, 1.0, 0.0);

    let mut wps = ring(cfg, c, FACE_RADIUS * k, FACE_POINTS, yellow, 1);
    for (side, seg) in [(-1.0, 2), (1.0, 3)] {
        // up is -z in NED
        let eye = Ned::new(c.x + side * EYE_OFFSET.0 * k, c.y, c.z - EYE_OFFSET.1 * k);
        wps.extend(ring(cfg, eye, EYE_RADIUS * k, EYE_POINTS, Rgb::BLUE, seg));
    }

    // lower half of a circle: ends level with its center, middle dips toward the chin
    let smile = Ned::new(c.x, c.y, c.z + SMILE_DROP * k);
    wps.extend((0..SMILE_POINTS).map(|i| {
        let angle = (i as f64 / (SMILE_POINTS - 1) as f64) * std::f64::consts::PI;
        let position = Ned::new(smile.x + SMILE_RADIUS * k * angle.cos(), c.y, smile.z + SMILE_RADIUS * k * angle.sin());
        waypoint(cfg, position, Rgb::RED, cfg.brightness, 4)
    }));
    Path::checked(wps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hue_wheel_hits_primaries() {
        assert_eq!(hue(0.0), Rgb::RED);
        assert_eq!(hue(0.25), Rgb::new(0.5, 1.0, 0.0));
        assert_eq!(hue(0.5), Rgb::new(0.0, 1.0, 1.0));
        assert_eq!(hue(1.0), Rgb::RED);
    }

    #[test]
    fn square_is_closed_single_stroke_in_north_down_plane() {
        let cfg = MissionConfig { points: 4, ..Default::default() };
        let path = square(&cfg).unwrap();
        assert_eq!(path.len(), 17);
        assert_eq!(path.stroke_count(), 1);
        let wps = path.waypoints();
        assert_eq!(wps[0].position, wps[16].position);
        assert!(wps.iter().all(|w| w.position.y == cfg.center_ned.y));
    }

    #[test]
    fn dashed_square_has_four_strokes() {
        let path = dashed_square(&MissionConfig::default()).unwrap();
        assert_eq!(path.len(), 8);
        assert_eq!(path.stroke_count(), 4);
    }

    #[test]
    fn spiral_rises_and_brightens() {
        let cfg = MissionConfig { points: 10, spiral_turns: 2.0, ..Default::default() };
        let path = spiral(&cfg).unwrap();
        assert_eq!(path.len(), 20);
        let wps = path.waypoints();
        assert!(wps.windows(2).all(|w| w[1].position.z < w[0].position.z));
        assert!(wps.windows(2).all(|w| w[1].brightness >= w[0].brightness));
        assert!((wps[19].brightness - cfg.brightness).abs() < 1e-6);
    }

    #[test]
    fn invalid_brightness_is_rejected() {
        let cfg = MissionConfig { brightness: 1.5, ..Default::default() };
        assert!(matches!(hop(&cfg), Err(PathError::Brightness { .. })));
    }

    #[test]
    fn smiley_is_four_strokes_in_one_plane() {
        let cfg = MissionConfig::default();
        let path = smiley(&cfg).unwrap();
        assert_eq!(path.stroke_count(), 4);
        assert_eq!(path.len(), (FACE_POINTS + 1) + 2 * (EYE_POINTS + 1) + SMILE_POINTS);

        let wps = path.waypoints();
        assert!(wps.iter().all(|w| w.position.y == cfg.center_ned.y));
        // face ring closes on itself
        assert!(wps[0].position.distance(&wps[FACE_POINTS].position) < 1e-9);
        // eyes above the center, smile below
        let eye = &wps[FACE_POINTS + 1];
        assert!(eye.position.z < cfg.center_ned.z);
        assert_eq!(eye.color, Rgb::BLUE);
        let smile = &wps[wps.len() - SMILE_POINTS..];
        assert!(smile.iter().all(|w| w.segment_id == 4 && w.position.z > cfg.center_ned.z));
        // corners of the mouth sit higher (smaller z) than its middle
        assert!(smile[0].position.z < smile[SMILE_POINTS / 2].position.z);
    }
}
