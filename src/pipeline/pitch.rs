//! Note-name and note-length arithmetic.
//!
//! Notes use scientific pitch notation (`C4` is MIDI 60). Accidentals are `#`
//! or `b`; names produced here always use sharps. Lengths use the symbolic
//! form `8n` (eighth note), `8n.` (dotted), `8t` (triplet) and `2m` (measures).

use std::fmt;
use std::str::FromStr;

const SHARP_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

const BEATS_PER_WHOLE: f32 = 4.0;

const MIDI_RANGE: std::ops::RangeInclusive<i32> = 0..=127;
const OCTAVES: std::ops::RangeInclusive<i32> = -1..=9;

/// A pitch as a MIDI note number. Parsing and transposition keep it in 0..=127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch(pub i32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PitchError {
    InvalidNote(String),
    InvalidLength(String),
}

impl fmt::Display for PitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchError::InvalidNote(s) => write!(f, "Invalid note: {}", s),
            PitchError::InvalidLength(s) => write!(f, "Invalid note length: {}", s),
        }
    }
}

impl std::error::Error for PitchError {}

impl Pitch {
    pub const C4: Pitch = Pitch(60);

    /// None when the result leaves the MIDI range.
    pub fn transpose(self, semitones: i32) -> Option<Self> {
        self.0
            .checked_add(semitones)
            .filter(|n| MIDI_RANGE.contains(n))
            .map(Pitch)
    }

    pub fn frequency(self) -> f32 {
        440.0 * 2f32.powf((self.0 as f32 - 69.0) / 12.0)
    }
}

impl FromStr for Pitch {
    type Err = PitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PitchError::InvalidNote(s.to_string());
        let mut chars = s.trim().chars().peekable();

        let letter = chars.next().ok_or_else(invalid)?;
        let class = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let accidental = match chars.peek() {
            Some('#') => {
                chars.next();
                1
            }
            Some('b') => {
                chars.next();
                -1
            }
            _ => 0,
        };

        let octave: String = chars.collect();
        if octave.is_empty() {
            return Err(invalid());
        }
        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        if !OCTAVES.contains(&octave) {
            return Err(invalid());
        }

        // Cb-1 and B#9 and above fall outside MIDI even with a valid octave
        let number = (octave + 1) * 12 + class + accidental;
        if !MIDI_RANGE.contains(&number) {
            return Err(invalid());
        }
        Ok(Pitch(number))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = self.0.rem_euclid(12) as usize;
        let octave = self.0.div_euclid(12) - 1;
        write!(f, "{}{}", SHARP_NAMES[class], octave)
    }
}

/// Shift a note name up by `semitones`, e.g. `("C4", 2)` gives `"D4"`.
pub fn transpose_note(note: &str, semitones: i32) -> Option<String> {
    let pitch: Pitch = note.parse().ok()?;
    Some(pitch.transpose(semitones)?.to_string())
}

/// A symbolic note length measured in quarter-note beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteLength {
    beats: f32,
}

impl NoteLength {
    pub fn eighth() -> Self {
        NoteLength { beats: 0.5 }
    }

    pub fn beats(self) -> f32 {
        self.beats
    }

    pub fn seconds(self, bpm: f32) -> f32 {
        self.beats * 60.0 / bpm.max(1.0)
    }
}

impl FromStr for NoteLength {
    type Err = PitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PitchError::InvalidLength(s.to_string());
        let s = s.trim();

        let (body, dotted) = match s.strip_suffix('.') {
            Some(body) => (body, true),
            None => (s, false),
        };
        let unit = body.chars().last().ok_or_else(invalid)?;
        let count: u32 = body[..body.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        let mut beats = match unit.to_ascii_lowercase() {
            'n' => BEATS_PER_WHOLE / count as f32,
            't' => BEATS_PER_WHOLE / count as f32 * 2.0 / 3.0,
            'm' => BEATS_PER_WHOLE * count as f32,
            _ => return Err(invalid()),
        };
        if dotted {
            beats *= 1.5;
        }
        Ok(NoteLength { beats })
    }
}
