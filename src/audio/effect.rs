use super::frame::StereoFrame;
use crate::pipeline::track::EffectKind;

const DISTORTION_DRIVE: f32 = 0.8;
const REVERB_WET: f32 = 0.35;
const REVERB_FEEDBACK: f32 = 0.84;
const REVERB_DAMPING: f32 = 0.2;
const REVERB_TAIL_SECS: f32 = 3.0;
const DELAY_BEATS: f32 = 0.25; // a sixteenth note

// Freeverb tunings at 44.1 kHz, scaled to the running rate
const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNING: [usize; 2] = [556, 441];

pub trait Effect: Send {
    fn process(&mut self, buf: &mut [StereoFrame]);

    // how long the effect keeps ringing after its input goes quiet
    fn tail_frames(&self) -> u64 {
        0
    }
}

/// Build the processing node for one configured effect. Unrecognized kinds
/// produce nothing so the rest of the chain still builds.
pub fn build_effect(kind: &EffectKind, sample_rate: f32, bpm: f32) -> Option<Box<dyn Effect>> {
    match kind {
        EffectKind::Reverb => Some(Box::new(Reverb::new(sample_rate))),
        EffectKind::Delay => {
            let secs = DELAY_BEATS * 60.0 / bpm.max(1.0);
            Some(Box::new(Delay::new(secs, sample_rate)))
        }
        EffectKind::Distortion => Some(Box::new(Distortion::new(DISTORTION_DRIVE))),
        EffectKind::Other(_) => None,
    }
}

//distortion
pub struct Distortion {
    drive: f32,
}

impl Distortion {
    pub fn new(drive: f32) -> Self {
        Self {
            drive: drive.clamp(0.0, 1.0),
        }
    }
}

impl Effect for Distortion {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        let pre_gain = 1.0 + self.drive * 10.0;
        for f in buf.iter_mut() {
            f.left = (pre_gain * f.left.clamp(-1.0, 1.0)).tanh();
            f.right = (pre_gain * f.right.clamp(-1.0, 1.0)).tanh();
        }
    }
}

//delay: output is only the delayed signal
pub struct Delay {
    line: Vec<StereoFrame>,
    pos: usize,
}

impl Delay {
    pub fn new(secs: f32, sample_rate: f32) -> Self {
        let len = ((secs * sample_rate).round() as usize).max(1);
        Self {
            line: vec![StereoFrame::zero(); len],
            pos: 0,
        }
    }
}

impl Effect for Delay {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let out = self.line[self.pos];
            self.line[self.pos] = *f;
            *f = out;
            self.pos = (self.pos + 1) % self.line.len();
        }
    }

    fn tail_frames(&self) -> u64 {
        self.line.len() as u64
    }
}

//reverb: four damped combs in parallel, then two allpasses in series
pub struct Reverb {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    tail: u64,
}

struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let scale = |n: usize| ((n as f32 * sample_rate / 44100.0) as usize).max(1);
        Self {
            combs: COMB_TUNING
                .iter()
                .map(|&n| Comb {
                    buffer: vec![0.0; scale(n)],
                    pos: 0,
                    filter_state: 0.0,
                })
                .collect(),
            allpasses: ALLPASS_TUNING
                .iter()
                .map(|&n| Allpass {
                    buffer: vec![0.0; scale(n)],
                    pos: 0,
                })
                .collect(),
            tail: (REVERB_TAIL_SECS * sample_rate) as u64,
        }
    }

    fn tick(&mut self, input: f32) -> f32 {
        let mut out = 0.0;
        for comb in self.combs.iter_mut() {
            let delayed = comb.buffer[comb.pos];
            comb.filter_state = delayed * (1.0 - REVERB_DAMPING) + comb.filter_state * REVERB_DAMPING;
            comb.buffer[comb.pos] = input + comb.filter_state * REVERB_FEEDBACK;
            comb.pos = (comb.pos + 1) % comb.buffer.len();
            out += delayed;
        }
        out /= self.combs.len() as f32;

        for ap in self.allpasses.iter_mut() {
            let delayed = ap.buffer[ap.pos];
            let y = -out + delayed;
            ap.buffer[ap.pos] = out + delayed * 0.5;
            ap.pos = (ap.pos + 1) % ap.buffer.len();
            out = y;
        }
        out
    }
}

impl Effect for Reverb {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let wet = self.tick(0.5 * (f.left + f.right));
            f.left = f.left * (1.0 - REVERB_WET) + wet * REVERB_WET;
            f.right = f.right * (1.0 - REVERB_WET) + wet * REVERB_WET;
        }
    }

    fn tail_frames(&self) -> u64 {
        self.tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(n: usize) -> Vec<StereoFrame> {
        let mut buf = vec![StereoFrame::zero(); n];
        buf[0] = StereoFrame::mono(1.0);
        buf
    }

    #[test]
    fn test_unknown_kind_builds_nothing() {
        assert!(build_effect(&EffectKind::Other("flanger".into()), 44100.0, 120.0).is_none());
        assert!(build_effect(&EffectKind::Reverb, 44100.0, 120.0).is_some());
    }

    #[test]
    fn test_delay_shifts_signal() {
        // a sixteenth at 120 bpm is 0.125s, 125 frames at 1 kHz
        let mut delay = build_effect(&EffectKind::Delay, 1000.0, 120.0).unwrap();
        let mut buf = impulse(200);
        delay.process(&mut buf);
        assert_eq!(buf[0].peak(), 0.0);
        assert_eq!(buf[125].left, 1.0);
        assert_eq!(delay.tail_frames(), 125);
    }

    #[test]
    fn test_distortion_bounded() {
        let mut dist = Distortion::new(0.8);
        let mut buf = vec![StereoFrame::mono(0.9), StereoFrame::mono(-3.0)];
        dist.process(&mut buf);
        assert!(buf.iter().all(|f| f.peak() <= 1.0));
        assert!(buf[0].left > 0.9);
    }

    #[test]
    fn test_reverb_rings_after_input() {
        let mut reverb = Reverb::new(8000.0);
        let mut buf = impulse(4000);
        reverb.process(&mut buf);
        let late = buf[2000..].iter().map(|f| f.peak()).fold(0.0, f32::max);
        assert!(late > 0.0);
        assert!(late < 1.0);
    }
}
