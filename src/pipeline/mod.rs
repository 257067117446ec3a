// the control side: track data in, scheduled commands out to the engine

pub mod bounce;
pub mod builder;
pub mod instrument;
pub mod keyboard;
pub mod parser;
pub mod persistence;
pub mod pitch;
pub mod reconciler;
pub mod scheduler;
pub mod track;
pub mod transport;

use crate::audio_api::{CommandSink, EngineError};
use crate::config::EngineConfig;

use builder::Builder;
use keyboard::KeyboardRouter;
use reconciler::{ReconcileReport, Reconciler};
use scheduler::Scheduler;
use track::{Track, TrackId};

pub type StepCallback = Box<dyn FnMut(u64) + Send>;

/// Everything the host talks to, in one place. Every call here runs to
/// completion before the next, so a tick never sees a half-applied edit.
pub struct Pipeline {
    sink: CommandSink,
    reconciler: Reconciler,
    scheduler: Scheduler,
    keyboard: KeyboardRouter,
    lookahead: f64,
    on_step: Option<StepCallback>,
}

impl Pipeline {
    pub fn new(sink: CommandSink, config: &EngineConfig, bpm: f32) -> Self {
        let builder = Builder::new(sink.clone(), bpm);
        Self {
            sink,
            reconciler: Reconciler::new(builder),
            scheduler: Scheduler::new(bpm, config.tempo_ramp_secs),
            keyboard: KeyboardRouter::new(),
            lookahead: config.lookahead_secs(),
            on_step: None,
        }
    }

    /// Called once per tick with the counter value just fired.
    pub fn set_on_step(&mut self, callback: impl FnMut(u64) + Send + 'static) {
        self.on_step = Some(Box::new(callback));
    }

    fn now(&self) -> f64 {
        self.sink.clock().now()
    }

    pub fn reconcile(&mut self, tracks: &[Track]) -> ReconcileReport {
        self.reconciler.reconcile(tracks)
    }

    pub fn is_silent(&self, id: TrackId) -> bool {
        self.reconciler.is_silent(id)
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        let now = self.now();
        self.scheduler.set_tempo(bpm, now);
        self.reconciler.builder_mut().set_tempo(self.scheduler.target_bpm());
    }

    pub fn bpm(&self) -> f32 {
        self.scheduler.target_bpm()
    }

    pub fn start(&mut self) {
        let now = self.now();
        self.scheduler.start(now);
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        let now = self.now();
        self.scheduler.resume(now);
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn counter(&self) -> Option<u64> {
        self.scheduler.counter()
    }

    pub fn attack(&mut self, degree: u8) -> Vec<EngineError> {
        let now = self.now();
        self.keyboard
            .attack(degree, self.reconciler.routed(), self.reconciler.builder(), now)
    }

    pub fn release(&mut self, degree: u8) {
        self.keyboard.release(degree);
    }

    pub fn held_keys(&self) -> [bool; crate::shared::NUM_KEYS] {
        self.keyboard.held()
    }

    /// Fire every tick falling inside the lookahead window. Returns how many fired.
    pub fn pump(&mut self) -> usize {
        let horizon = self.now() + self.lookahead;
        let mut fired = 0;
        while self.scheduler.due(horizon).is_some() {
            let t = self.scheduler.tick(&self.reconciler);
            if let Some(on_step) = self.on_step.as_mut() {
                on_step(t);
            }
            fired += 1;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::testing::{drain, installed, sink, triggers};
    use std::sync::{Arc, Mutex};

    fn pipeline() -> (Pipeline, crate::audio_api::CommandQueue) {
        let (sink, queue) = sink(32);
        (Pipeline::new(sink, &EngineConfig::default(), 120.0), queue)
    }

    #[test]
    fn test_pump_fills_lookahead_and_reports_steps() {
        let (mut p, queue) = pipeline();
        let mut track = Track::with_note("C4");
        track.sequencer.toggle(0);
        p.reconcile(&[track]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        p.set_on_step(move |t| log.lock().unwrap().push(t));

        assert_eq!(p.pump(), 0); // not started
        p.start();
        // 100ms lookahead at 120 bpm: only the tick at 0.0 (the next is 0.25s)
        assert_eq!(p.pump(), 1);
        assert_eq!(p.pump(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(triggers(&drain(&queue)).len(), 1);
    }

    #[test]
    fn test_pause_keeps_instruments() {
        let (mut p, queue) = pipeline();
        let tracks = vec![Track::with_note("C4")];
        p.reconcile(&tracks);
        drain(&queue);
        p.start();
        p.pause();
        p.resume();
        assert!(p.reconcile(&tracks).built.is_empty());
        assert!(installed(&drain(&queue)).is_empty());
    }

    #[test]
    fn test_attack_uses_routed_tracks() {
        let (mut p, queue) = pipeline();
        let mut routed = Track::with_note("C4");
        routed.instrument.route_to_keyboard = true;
        p.reconcile(&[routed, Track::with_note("E4")]);
        drain(&queue);
        assert!(p.attack(2).is_empty());
        assert_eq!(triggers(&drain(&queue)).len(), 1);
        assert!(p.held_keys()[2]);
        p.release(2);
        assert!(!p.held_keys()[2]);
    }

    #[test]
    fn test_set_tempo_targets() {
        let (mut p, _queue) = pipeline();
        p.set_tempo(150.0);
        assert_eq!(p.bpm(), 150.0);
    }
}
