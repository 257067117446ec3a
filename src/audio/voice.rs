use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::envelope::{Adsr, Envelope};
use super::frame::StereoFrame;
use crate::pipeline::track::VoiceKind;

// headroom so a handful of tracks on one step don't clip the master
const VOICE_LEVEL: f32 = 0.3;

const AM_HARMONICITY: f32 = 3.0;
const FM_HARMONICITY: f32 = 3.0;
const FM_INDEX: f32 = 10.0;
const DUO_HARMONICITY: f32 = 1.5;
const DUO_VIBRATO_HZ: f32 = 5.0;
const DUO_VIBRATO_DEPTH: f32 = 0.01; // fraction of an octave
const MEMBRANE_OCTAVES: f32 = 10.0;
const MEMBRANE_PITCH_DECAY: f32 = 0.05; // seconds
const METAL_RATIOS: [f32; 6] = [1.0, 1.483, 1.932, 2.546, 2.630, 3.897];

fn envelope_shape(kind: VoiceKind) -> Adsr {
    let adsr = |attack, decay, sustain, release| Adsr { attack, decay, sustain, release };
    match kind {
        VoiceKind::Sine => adsr(0.005, 0.1, 0.3, 1.0),
        VoiceKind::Am | VoiceKind::Fm => adsr(0.01, 0.01, 1.0, 0.5),
        VoiceKind::Duo => adsr(0.01, 0.01, 1.0, 0.5),
        VoiceKind::Membrane => adsr(0.001, 0.4, 0.01, 1.4),
        VoiceKind::Noise => adsr(0.005, 0.1, 0.0, 0.3),
        VoiceKind::Metal => adsr(0.001, 1.4, 0.0, 0.2),
    }
}

/// One synthesis engine. Plays a single note at a time; a new `note_on`
/// retriggers from wherever the envelope currently is.
pub struct Voice {
    kind: VoiceKind,
    sample_rate: f32,
    env: Envelope,
    frequency: f32,
    phases: [f32; 6], // oscillator phases in cycles, 0.0..1.0
    gate_remaining: u64,
    age: u64,
    rng: StdRng,
}

impl Voice {
    pub fn new(kind: VoiceKind, sample_rate: f32) -> Self {
        Self {
            kind,
            sample_rate,
            env: Envelope::new(envelope_shape(kind), sample_rate),
            frequency: 440.0,
            phases: [0.0; 6],
            gate_remaining: 0,
            age: 0,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    /// Attack now, release after `gate_frames`.
    pub fn note_on(&mut self, frequency: f32, gate_frames: u64) {
        // an infinite or NaN frequency would poison the phase accumulators for good
        self.frequency = if frequency.is_finite() {
            frequency.clamp(0.0, self.sample_rate / 2.0)
        } else {
            0.0
        };
        self.gate_remaining = gate_frames.max(1);
        self.age = 0;
        self.env.gate_on();
    }

    pub fn is_idle(&self) -> bool {
        self.env.is_idle()
    }

    /// Overwrites `out` with this voice's signal.
    pub fn render(&mut self, out: &mut [StereoFrame]) {
        for frame in out.iter_mut() {
            if self.env.is_idle() {
                *frame = StereoFrame::zero();
                continue;
            }
            if self.gate_remaining > 0 {
                self.gate_remaining -= 1;
                if self.gate_remaining == 0 {
                    self.env.gate_off();
                }
            }
            let level = self.env.next();
            let sample = self.oscillate(level);
            *frame = StereoFrame::mono(sample * level * VOICE_LEVEL);
            self.age += 1;
        }
    }

    fn oscillate(&mut self, level: f32) -> f32 {
        let f = self.frequency;
        match self.kind {
            VoiceKind::Sine => {
                let s = (TAU * self.phases[0]).sin();
                self.step(0, f);
                s
            }
            VoiceKind::Am => {
                let carrier = (TAU * self.phases[0]).sin();
                let modulator = (TAU * self.phases[1]).sin();
                self.step(0, f);
                self.step(1, f * AM_HARMONICITY);
                carrier * (0.5 + 0.5 * modulator)
            }
            VoiceKind::Fm => {
                // modulation depth follows the amplitude envelope
                let modulator = (TAU * self.phases[1]).sin();
                let s = (TAU * self.phases[0] + FM_INDEX * level * modulator).sin();
                self.step(0, f);
                self.step(1, f * FM_HARMONICITY);
                s
            }
            VoiceKind::Duo => {
                let vibrato = 2f32.powf(DUO_VIBRATO_DEPTH * (TAU * self.phases[2]).sin());
                let s = 0.5 * ((TAU * self.phases[0]).sin() + (TAU * self.phases[1]).sin());
                self.step(0, f * vibrato);
                self.step(1, f * DUO_HARMONICITY * vibrato);
                self.step(2, DUO_VIBRATO_HZ);
                s
            }
            VoiceKind::Membrane => {
                // exponential sweep from f * octaves down to f
                let t = self.age as f32 / (MEMBRANE_PITCH_DECAY * self.sample_rate);
                let sweep = MEMBRANE_OCTAVES.powf((1.0 - t).max(0.0));
                let s = (TAU * self.phases[0]).sin();
                self.step(0, f * sweep);
                s
            }
            VoiceKind::Noise => self.rng.random::<f32>() * 2.0 - 1.0,
            VoiceKind::Metal => {
                let mut sum = 0.0;
                for (i, ratio) in METAL_RATIOS.iter().enumerate() {
                    sum += if self.phases[i] < 0.5 { 1.0 } else { -1.0 };
                    self.step(i, f * ratio);
                }
                sum / METAL_RATIOS.len() as f32
            }
        }
    }

    fn step(&mut self, i: usize, frequency: f32) {
        self.phases[i] += frequency / self.sample_rate;
        self.phases[i] -= self.phases[i].floor();
    }
}
