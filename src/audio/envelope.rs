/// ADSR shape in seconds (sustain is a level, 0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR envelope stepped one sample at a time.
///
/// Retriggering during a note ramps up from the current level, and releasing
/// ramps down from it, so neither produces a jump in amplitude.
#[derive(Debug, Clone)]
pub struct Envelope {
    attack: usize,
    decay: usize,
    sustain: f32,
    release: usize,

    stage: Stage,
    position: usize,
    level: f32,
    start_level: f32,
}

impl Envelope {
    pub fn new(shape: Adsr, sample_rate: f32) -> Self {
        let frames = |secs: f32| ((secs * sample_rate) as usize).max(1);
        Self {
            attack: frames(shape.attack),
            decay: frames(shape.decay),
            sustain: shape.sustain.clamp(0.0, 1.0),
            release: frames(shape.release),
            stage: Stage::Idle,
            position: 0,
            level: 0.0,
            start_level: 0.0,
        }
    }

    pub fn gate_on(&mut self) {
        self.stage = Stage::Attack;
        self.position = 0;
        self.start_level = self.level;
    }

    pub fn gate_off(&mut self) {
        match self.stage {
            Stage::Attack | Stage::Decay | Stage::Sustain => {
                self.stage = Stage::Release;
                self.position = 0;
                self.start_level = self.level;
            }
            Stage::Release | Stage::Idle => {}
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn next(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                let t = self.position as f32 / self.attack as f32;
                self.level = self.start_level + (1.0 - self.start_level) * t;
                self.advance(self.attack, Stage::Decay);
            }
            Stage::Decay => {
                let t = self.position as f32 / self.decay as f32;
                self.level = 1.0 + (self.sustain - 1.0) * t;
                self.advance(self.decay, Stage::Sustain);
            }
            Stage::Sustain => {
                self.level = self.sustain;
            }
            Stage::Release => {
                let t = self.position as f32 / self.release as f32;
                self.level = self.start_level * (1.0 - t);
                self.advance(self.release, Stage::Idle);
            }
        }
        self.level
    }

    fn advance(&mut self, length: usize, next: Stage) {
        self.position += 1;
        if self.position >= length {
            self.position = 0;
            self.stage = next;
        }
    }
}
