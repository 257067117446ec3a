use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The audio clock: how many frames the engine has rendered so far.
///
/// Every scheduling decision is made against this clock rather than wall time,
/// so a trigger stamped with `t` seconds starts on exactly frame `t * rate`.
#[derive(Clone, Debug)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    // only the engine moves the clock
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn frames_for(&self, seconds: f32) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f32).round() as u64
    }
}
