use tracing::info;

use super::reconciler::Reconciler;
use crate::shared::{MAX_BPM, MIN_BPM};

const TICKS_PER_BEAT: f64 = 2.0; // the grid is eighth notes

#[derive(Clone, Copy, Debug)]
struct Ramp {
    from: f32,
    to: f32,
    start: f64,
    secs: f64,
}

impl Ramp {
    fn bpm_at(&self, time: f64) -> f32 {
        if self.secs <= 0.0 || time >= self.start + self.secs {
            return self.to;
        }
        let t = ((time - self.start) / self.secs).clamp(0.0, 1.0) as f32;
        self.from + (self.to - self.from) * t
    }
}

/// Tick timing and the global step counter. Times are seconds on the audio clock.
#[derive(Debug)]
pub struct Scheduler {
    next_counter: u64,
    next_time: f64,
    running: bool,
    ramp: Ramp,
    ramp_secs: f64,
}

impl Scheduler {
    pub fn new(bpm: f32, ramp_secs: f32) -> Self {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        Self {
            next_counter: 0,
            next_time: 0.0,
            running: false,
            ramp: Ramp {
                from: bpm,
                to: bpm,
                start: 0.0,
                secs: 0.0,
            },
            ramp_secs: ramp_secs.max(0.0) as f64,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Last counter value fired, if any.
    pub fn counter(&self) -> Option<u64> {
        self.next_counter.checked_sub(1)
    }

    pub fn bpm_at(&self, time: f64) -> f32 {
        self.ramp.bpm_at(time)
    }

    /// Where the tempo is heading (the ramp target).
    pub fn target_bpm(&self) -> f32 {
        self.ramp.to
    }

    pub fn start(&mut self, now: f64) {
        self.next_time = now;
        self.running = true;
        info!("transport started at {:.3}s", now);
    }

    // the counter and every built instrument are left alone
    pub fn pause(&mut self) {
        self.running = false;
        info!("transport paused at counter {:?}", self.counter());
    }

    pub fn resume(&mut self, now: f64) {
        if self.running {
            return;
        }
        self.next_time = self.next_time.max(now);
        self.running = true;
        info!("transport resumed");
    }

    /// Glide from the tempo playing at `now` to `bpm` over the ramp window.
    pub fn set_tempo(&mut self, bpm: f32, now: f64) {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.ramp = Ramp {
            from: self.ramp.bpm_at(now),
            to: bpm,
            start: now,
            secs: self.ramp_secs,
        };
        info!("tempo -> {} bpm", bpm);
    }

    /// Seconds per tick at `time`.
    pub fn period_at(&self, time: f64) -> f64 {
        60.0 / self.bpm_at(time) as f64 / TICKS_PER_BEAT
    }

    /// Timestamp of the next tick if it falls before `horizon`.
    pub fn due(&self, horizon: f64) -> Option<f64> {
        (self.running && self.next_time < horizon).then_some(self.next_time)
    }

    /// Fire one tick: every track whose step under the counter is on triggers
    /// at the same timestamp, in track order. Returns the counter value.
    pub fn tick(&mut self, reconciler: &Reconciler) -> u64 {
        let t = self.next_counter;
        let time = self.next_time;
        let bpm = self.bpm_at(time);
        for (sequencer, handle) in reconciler.live() {
            match handle {
                Some(handle) if sequencer.is_active(t) => {
                    handle.trigger(time, bpm);
                }
                _ => {}
            }
        }
        self.next_counter += 1;
        self.next_time += self.period_at(time);
        t
    }
}
