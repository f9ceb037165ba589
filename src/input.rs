// input.rs — drag-to-look and time-based auto-rotation

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

/// Where a drag started and the orientation at that moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragAnchor {
    pub x: f32,
    pub y: f32,
    pub lon: f32,
    pub lat: f32,
    /// Degrees per pixel.
    pub sensitivity: f32,
}

impl DragAnchor {
    /// Orientation for the pointer at (`x`, `y`). Dragging down looks up,
    /// like street-view controls. Latitude is not clamped here.
    pub fn orientation_at(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (self.x - x) * self.sensitivity + self.lon,
            (self.y - y) * self.sensitivity + self.lat,
        )
    }
}

/// Constant angular speed regardless of frame rate.
#[derive(Debug, Clone)]
pub struct AutoRotate {
    enabled: bool,
    /// Degrees per second.
    speed: f32,
    last_tick: Option<Duration>,
}

impl AutoRotate {
    pub fn new(speed: f32) -> Self {
        Self {
            enabled: true,
            speed,
            last_tick: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start(&mut self) {
        self.enabled = true;
        self.last_tick = None;
    }

    pub fn stop(&mut self) {
        self.enabled = false;
        self.last_tick = None;
    }

    /// Forget the previous tick so the next one does not jump over a pause.
    pub fn reset_baseline(&mut self) {
        self.last_tick = None;
    }

    /// Longitude delta for a frame at `now`.
    pub fn advance(&mut self, now: Duration) -> f32 {
        if !self.enabled {
            self.last_tick = None;
            return 0.0;
        }
        let delta = match self.last_tick {
            Some(last) => now.saturating_sub(last).as_secs_f32() * self.speed,
            None => 0.0,
        };
        self.last_tick = Some(now);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn drag_moves_opposite_to_the_pointer() {
        let anchor = DragAnchor {
            x: 100.0,
            y: 100.0,
            lon: 90.0,
            lat: 0.0,
            sensitivity: 0.1,
        };
        let (lon, lat) = anchor.orientation_at(50.0, 140.0);
        assert!((lon - 95.0).abs() < 1e-4);
        assert!((lat + 4.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_is_frame_rate_independent() {
        let mut fast = AutoRotate::new(3.0);
        let mut slow = AutoRotate::new(3.0);
        let fast_total: f32 = (0..=60).map(|i| fast.advance(ms(i * 1000 / 60))).sum();
        let slow_total: f32 = (0..=10).map(|i| slow.advance(ms(i * 100))).sum();
        assert!((fast_total - 3.0).abs() < 1e-3);
        assert!((slow_total - 3.0).abs() < 1e-3);
    }

    #[test]
    fn restart_does_not_jump() {
        let mut r = AutoRotate::new(3.0);
        r.advance(ms(0));
        r.stop();
        r.start();
        assert_eq!(r.advance(ms(60_000)), 0.0);
        assert!((r.advance(ms(61_000)) - 3.0).abs() < 1e-4);
    }
}
