//! One-line track notation
//!
//! Format:
//! <note>/<length> [@voice] [s<steps>] [<gain>%] [| @effect]*
//!
//! Examples:
//! - `C4/8n`                            eighth-note C4 on the default sine voice
//! - `E3/4n @membrane s12 80%`          drum voice, 12-step grid, gain 0.8
//! - `C4/8n @fm 75% | @reverb | @delay` fm voice through reverb then delay
//!
//! Parsing is tolerant: it runs on every keystroke, so anything it doesn't
//! understand leaves the corresponding field as it was.

use crate::pipeline::pitch::{NoteLength, Pitch};
use crate::pipeline::track::{EffectConfig, EffectKind, InstrumentConfig, Track, VoiceKind};
use crate::shared::{DEFAULT_STEPS, MAX_STEPS};

/// Apply `text` on top of `current`. Never fails.
pub fn parse_track(current: &Track, text: &str) -> Track {
    let mut next = current.clone();

    // split always yields at least one segment
    let mut segments = text.split('|');
    let head = segments.next().unwrap_or_default();

    let mut has_pair = false;
    for token in head.split_whitespace() {
        if let Some((note, length)) = note_and_length(token) {
            next.instrument.note = note.to_string();
            next.instrument.duration = length.to_string();
            has_pair = true;
        } else if let Some(name) = token.strip_prefix('@') {
            if let Some(kind) = VoiceKind::recognize(name) {
                next.instrument.kind = kind;
            }
        } else if let Some(steps) = steps_token(token) {
            next.sequencer.set_steps(steps);
        } else if let Some(gain) = gain_token(token) {
            next.instrument.gain = gain;
        }
    }

    // the effect list is replaced wholesale, but only for a line that reads as a
    // track description; stray text keeps the current chain
    let rest: Vec<&str> = segments.collect();
    if has_pair || !rest.is_empty() {
        next.instrument.effects = rest.into_iter().filter_map(segment_effect).collect();
    }

    next
}

/// Display form of an instrument; `parse_track` reads it back to the same config.
pub fn format_instrument(config: &InstrumentConfig) -> String {
    format_line(config, None)
}

/// Like `format_instrument`, plus `s<steps>` when the grid isn't the default length.
pub fn format_track(track: &Track) -> String {
    let steps = (track.sequencer.steps != DEFAULT_STEPS).then_some(track.sequencer.steps);
    format_line(&track.instrument, steps)
}

fn format_line(config: &InstrumentConfig, steps: Option<usize>) -> String {
    let mut out = format!("{}/{}", config.note, config.duration);
    if config.kind != VoiceKind::Sine {
        out.push_str(&format!(" @{}", config.kind.name()));
    }
    if let Some(steps) = steps {
        out.push_str(&format!(" s{}", steps));
    }
    if config.gain != 1.0 {
        out.push_str(&format!(" {}%", (config.gain * 100.0).round() as i64));
    }
    for effect in &config.effects {
        out.push_str(&format!(" | @{}", effect.kind.name()));
    }
    out
}

// both halves must be valid or the pair is ignored
fn note_and_length(token: &str) -> Option<(&str, &str)> {
    let (note, length) = token.split_once('/')?;
    note.parse::<Pitch>().ok()?;
    length.parse::<NoteLength>().ok()?;
    Some((note, length))
}

fn steps_token(token: &str) -> Option<usize> {
    let digits = token.strip_prefix(['s', 'S'])?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let steps: usize = digits.parse().ok()?;
    (1..=MAX_STEPS).contains(&steps).then_some(steps)
}

fn gain_token(token: &str) -> Option<f32> {
    let digits = token.strip_suffix('%')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let percent: u32 = digits.parse().ok()?;
    Some(percent as f32 / 100.0)
}

// zero or one recognized effect per segment
fn segment_effect(segment: &str) -> Option<EffectConfig> {
    segment
        .split_whitespace()
        .filter_map(|t| t.strip_prefix('@'))
        .find_map(EffectKind::recognize)
        .map(EffectConfig::new)
}
