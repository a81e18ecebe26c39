//! Stand-ins for the rotor hardware and the LED driver

use std::time::Instant;
use synchron_core::node::{Renderer, RotationSensor};

/// Rotor spinning at a constant speed since creation
pub struct SimulatedRotor {
    start: Instant,
    rpm: f32,
}

impl SimulatedRotor {
    pub fn new(rpm: f32) -> Self {
        Self {
            start: Instant::now(),
            rpm,
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl RotationSensor for SimulatedRotor {
    fn read_angle_deg(&mut self) -> f32 {
        let turns = self.elapsed_secs() * self.rpm as f64 / 60.0;
        let angle = (turns.fract() * 360.0) as f32;
        // Rounding to f32 can land on 360.0
        if angle >= 360.0 {
            0.0
        } else {
            angle
        }
    }

    fn read_time_ms(&mut self) -> u32 {
        // Wraps like a hardware millisecond counter
        self.start.elapsed().as_millis() as u32
    }
}

/// Renderer that reports what it would draw
#[derive(Debug, Default)]
pub struct LogRenderer {
    armed: bool,
    revolutions: u64,
    frames: u64,
}

impl LogRenderer {
    pub fn revolutions(&self) -> u64 {
        self.revolutions
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn arm(&mut self) {
        if !self.armed {
            log::info!("Renderer armed");
        }
        self.armed = true;
    }

    fn on_slice(&mut self, slice: u16) {
        if slice == 0 {
            self.revolutions += 1;
            log::trace!("Revolution {}", self.revolutions);
        }
    }

    fn swap_frame(&mut self, slice: u16, pixels: &[u8]) {
        self.frames += 1;
        log::trace!("Slice {}: {} pixels", slice, pixels.len() / 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_rotor_stays_put() {
        let mut rotor = SimulatedRotor::new(0.0);
        assert_eq!(rotor.read_angle_deg(), 0.0);
    }

    #[test]
    fn test_angle_in_range() {
        let mut rotor = SimulatedRotor::new(60_000.0);
        for _ in 0..100 {
            let angle = rotor.read_angle_deg();
            assert!((0.0..360.0).contains(&angle), "{}", angle);
        }
    }

    #[test]
    fn test_renderer_counts_revolutions() {
        let mut renderer = LogRenderer::default();
        for slice in [118u16, 119, 0, 1, 0] {
            renderer.on_slice(slice);
        }
        renderer.swap_frame(3, &[0; 16]);
        assert_eq!(renderer.revolutions(), 2);
        assert_eq!(renderer.frames(), 1);
    }
}
