use super::effect::Effect;
use super::frame::StereoFrame;
use super::voice::Voice;

/// A built instrument as the engine sees it: voice, then effects in order,
/// then the terminal gain stage into the master mix.
pub struct Chain {
    voice: Voice,
    effects: Vec<Box<dyn Effect>>,
    gain: f32,
    tail: u64,
    quiet_frames: u64,
}

impl Chain {
    pub fn new(voice: Voice, effects: Vec<Box<dyn Effect>>, gain: f32) -> Self {
        let tail = effects.iter().map(|e| e.tail_frames()).max().unwrap_or(0);
        Self {
            voice,
            effects,
            gain: gain.max(0.0),
            tail,
            quiet_frames: 0,
        }
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn note_on(&mut self, frequency: f32, gate_frames: u64) {
        self.quiet_frames = 0;
        self.voice.note_on(frequency, gate_frames);
    }

    /// Overwrites `out` with the chain's output.
    pub fn render(&mut self, out: &mut [StereoFrame]) {
        self.voice.render(out);
        for effect in self.effects.iter_mut() {
            effect.process(out);
        }
        for f in out.iter_mut() {
            *f = f.scaled(self.gain);
        }
        if self.voice.is_idle() {
            self.quiet_frames += out.len() as u64;
        }
    }

    // voice released and every effect tail has run out
    pub fn is_finished(&self) -> bool {
        self.voice.is_idle() && self.quiet_frames >= self.tail
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("voice", &self.voice.kind())
            .field("effects", &self.effects.len())
            .field("gain", &self.gain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::effect::{build_effect, Delay};
    use crate::pipeline::track::{EffectKind, VoiceKind};

    #[test]
    fn test_gain_scales_output() {
        let mut loud = Chain::new(Voice::new(VoiceKind::Sine, 8000.0), vec![], 1.0);
        let mut soft = Chain::new(Voice::new(VoiceKind::Sine, 8000.0), vec![], 0.5);
        loud.note_on(440.0, 400);
        soft.note_on(440.0, 400);
        let mut a = vec![StereoFrame::zero(); 200];
        let mut b = vec![StereoFrame::zero(); 200];
        loud.render(&mut a);
        soft.render(&mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x.left * 0.5 - y.left).abs() < 1e-6);
        }
    }

    #[test]
    fn test_finished_waits_for_tail() {
        let delay: Box<dyn Effect> = Box::new(Delay::new(2.0, 1000.0));
        let mut chain = Chain::new(Voice::new(VoiceKind::Noise, 1000.0), vec![delay], 1.0);
        chain.note_on(0.0, 10);
        let mut buf = vec![StereoFrame::zero(); 500]; // noise release is 0.3s
        chain.render(&mut buf);
        assert!(!chain.is_finished());
        for _ in 0..3 {
            chain.render(&mut buf);
        }
        assert!(chain.is_finished());
    }

    #[test]
    fn test_fresh_chain_counts_effects() {
        let fx = build_effect(&EffectKind::Reverb, 8000.0, 120.0).into_iter().collect();
        let chain = Chain::new(Voice::new(VoiceKind::Am, 8000.0), fx, 0.8);
        assert_eq!(chain.effect_count(), 1);
        assert_eq!(chain.gain(), 0.8);
    }
}
