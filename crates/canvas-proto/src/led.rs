use serde::{Deserialize, Serialize};

/// Linear RGB color, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const GREEN: Rgb = Rgb::new(0.0, 1.0, 0.0);
    pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// `self*(1-t) + other*t`. Exact at both endpoints.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        Rgb {
            r: lerp(self.r, other.r, t),
            g: lerp(self.g, other.g, t),
            b: lerp(self.b, other.b, t),
        }
    }

    /// 8-bit channels with brightness applied.
    pub fn to_bytes(self, brightness: f32) -> [u8; 3] {
        let k = brightness.clamp(0.0, 1.0);
        let q = |c: f32| (c.clamp(0.0, 1.0) * k * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// The single LED value rendered each tick. Last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedCommand {
    #[serde(flatten)]
    pub color: Rgb,
    pub brightness: f32,
    pub on: bool,
}

impl LedCommand {
    pub const OFF: LedCommand = LedCommand { color: Rgb::BLACK, brightness: 0.0, on: false };

    pub fn on(color: Rgb, brightness: f32) -> Self {
        Self { color, brightness: brightness.clamp(0.0, 1.0), on: true }
    }

    /// Bytes actually emitted by the light: zero when off.
    pub fn output_bytes(&self) -> [u8; 3] {
        if self.on { self.color.to_bytes(self.brightness) } else { [0, 0, 0] }
    }
}

impl Default for LedCommand {
    fn default() -> Self {
        Self::OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_is_exact_at_endpoints() {
        let a = Rgb::new(0.3, 0.7, 0.1);
        let b = Rgb::new(0.9, 0.2, 0.6);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn output_bytes_respect_brightness_and_off() {
        let led = LedCommand::on(Rgb::WHITE, 0.5);
        assert_eq!(led.output_bytes(), [128, 128, 128]);
        assert_eq!(LedCommand::OFF.output_bytes(), [0, 0, 0]);
    }

    #[test]
    fn set_led_shape_is_flat() {
        let v = serde_json::to_value(LedCommand::on(Rgb::RED, 1.0)).unwrap();
        assert_eq!(v["r"], 1.0);
        assert_eq!(v["on"], true);
        assert!(v.get("color").is_none());
    }
}
