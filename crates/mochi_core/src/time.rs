//! Fixed-step frame time
//!
//! Scripts receive a constant delta per update; 60 Hz by default.

use std::time::Duration;

/// Default update rate (60 Hz = 16.666ms per frame)
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

/// Frame counter handing out a constant delta time
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    frame_count: u64,
    elapsed: Duration,
}

impl FixedStep {
    pub fn new(tick_rate_hz: u32) -> Self {
        let hz = tick_rate_hz.max(1);
        Self {
            step: Duration::from_secs(1) / hz,
            frame_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Delta in seconds, the unit update delegates receive.
    pub fn delta_seconds(&self) -> f32 {
        self.step.as_secs_f32()
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advance one frame and return the delta for it.
    pub fn advance(&mut self) -> f32 {
        self.frame_count += 1;
        self.elapsed += self.step;
        self.delta_seconds()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE_HZ)
    }
}
