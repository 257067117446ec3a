// the plain data the host owns and persists; everything audio-side is derived from it

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::shared::{DEFAULT_BPM, DEFAULT_STEPS, MAX_STEPS};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a track. Never changes for the track's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn next() -> Self {
        TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    // ids loaded from disk must never be handed out again this session
    pub fn reserve_above(id: TrackId) {
        NEXT_TRACK_ID.fetch_max(id.0 + 1, Ordering::Relaxed);
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub sequencer: SequenceState,
    pub instrument: InstrumentConfig,
}

impl Track {
    pub fn new(instrument: InstrumentConfig) -> Self {
        Self {
            id: TrackId::next(),
            sequencer: SequenceState::new(DEFAULT_STEPS),
            instrument,
        }
    }

    pub fn with_note(note: &str) -> Self {
        Self::new(InstrumentConfig {
            note: note.to_string(),
            ..InstrumentConfig::default()
        })
    }
}

/// The step grid of one track.
///
/// Only indices below `steps` are played. Entries past `steps` are kept so that
/// shrinking the grid and growing it back restores earlier toggles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub steps: usize,
    pub sequence: Vec<bool>,
}

impl SequenceState {
    pub fn new(steps: usize) -> Self {
        let steps = steps.clamp(1, MAX_STEPS);
        Self {
            steps,
            sequence: vec![false; steps],
        }
    }

    /// Is the step under global counter `t` switched on?
    pub fn is_active(&self, t: u64) -> bool {
        if self.steps == 0 {
            return false;
        }
        let idx = (t % self.steps as u64) as usize;
        self.sequence.get(idx).copied().unwrap_or(false)
    }

    // grows with `false`, never truncates
    pub fn set_steps(&mut self, steps: usize) {
        self.steps = steps.clamp(1, MAX_STEPS);
        if self.sequence.len() < self.steps {
            self.sequence.resize(self.steps, false);
        }
    }

    pub fn toggle(&mut self, step: usize) {
        if step >= self.steps {
            return;
        }
        if self.sequence.len() <= step {
            self.sequence.resize(step + 1, false);
        }
        self.sequence[step] = !self.sequence[step];
    }

    pub fn visible(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.steps).map(|i| self.sequence.get(i).copied().unwrap_or(false))
    }
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentConfig {
    pub note: String,
    pub duration: String,
    #[serde(rename = "type")]
    pub kind: VoiceKind,
    pub gain: f32,
    pub route_to_keyboard: bool,
    pub effects: Vec<EffectConfig>, // signal-chain order, first is closest to the voice
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            note: "C4".to_string(),
            duration: "8n".to_string(),
            kind: VoiceKind::Sine,
            gain: 1.0,
            route_to_keyboard: false,
            effects: Vec::new(),
        }
    }
}

impl InstrumentConfig {
    /// Stable serialization used to detect "nothing changed" between reconciles.
    pub fn fingerprint(&self) -> String {
        // plain data with string keys can't fail to serialize; Debug is the fallback anyway
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VoiceKind {
    Sine,
    Am,
    Fm,
    Duo,
    Membrane,
    Noise,
    Metal,
}

impl VoiceKind {
    pub const ALL: [VoiceKind; 7] = [
        VoiceKind::Sine,
        VoiceKind::Am,
        VoiceKind::Fm,
        VoiceKind::Duo,
        VoiceKind::Membrane,
        VoiceKind::Noise,
        VoiceKind::Metal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VoiceKind::Sine => "sine",
            VoiceKind::Am => "am",
            VoiceKind::Fm => "fm",
            VoiceKind::Duo => "duo",
            VoiceKind::Membrane => "membrane",
            VoiceKind::Noise => "noise",
            VoiceKind::Metal => "metal",
        }
    }

    pub fn recognize(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

// unknown or missing voice types play as sine
impl From<String> for VoiceKind {
    fn from(name: String) -> Self {
        VoiceKind::recognize(&name).unwrap_or(VoiceKind::Sine)
    }
}

impl From<VoiceKind> for String {
    fn from(kind: VoiceKind) -> Self {
        kind.name().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectConfig {
    #[serde(rename = "type")]
    pub kind: EffectKind,
}

impl EffectConfig {
    pub fn new(kind: EffectKind) -> Self {
        Self { kind }
    }
}

/// Effect kinds. Anything unrecognized is kept as data but skipped when building.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectKind {
    Reverb,
    Delay,
    Distortion,
    Other(String),
}

impl EffectKind {
    pub fn recognize(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "reverb" => Some(EffectKind::Reverb),
            "delay" => Some(EffectKind::Delay),
            "distortion" => Some(EffectKind::Distortion),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Distortion => "distortion",
            EffectKind::Other(name) => name,
        }
    }
}

impl From<String> for EffectKind {
    fn from(name: String) -> Self {
        EffectKind::recognize(&name).unwrap_or(EffectKind::Other(name))
    }
}

impl From<EffectKind> for String {
    fn from(kind: EffectKind) -> Self {
        kind.name().to_string()
    }
}

/// What the host persists: the canonical track list plus tempo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    pub tracks: Vec<Track>,
    pub bpm: f32,
}

impl Default for ProjectState {
    fn default() -> Self {
        let notes = ["C4", "D4", "E4", "F4", "G4", "A5", "B5"];
        Self {
            tracks: notes.iter().map(|n| Track::with_note(n)).collect(),
            bpm: DEFAULT_BPM,
        }
    }
}
