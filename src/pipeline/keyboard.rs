use tracing::warn;

use crate::audio_api::EngineError;
use crate::shared::{KEYBOARD_KEYS, NUM_KEYS};

use super::builder::Builder;
use super::pitch::{Pitch, transpose_note};
use super::track::InstrumentConfig;

/// Scale degree for a key in keyboard mode, one semitone per key.
pub fn key_degree(key: char) -> Option<u8> {
    KEYBOARD_KEYS
        .iter()
        .position(|k| *k == key.to_ascii_lowercase())
        .map(|i| i as u8)
}

/// Plays routed tracks from the computer keyboard.
///
/// Each attack builds a transposed one-shot copy of every routed instrument and
/// fires it right away; the engine frees it once it has rung out. Nothing is
/// held until release.
#[derive(Debug, Default)]
pub struct KeyboardRouter {
    held: [bool; NUM_KEYS],
}

impl KeyboardRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> [bool; NUM_KEYS] {
        self.held
    }

    /// Fire every routed config shifted up by `degree` semitones at `at`.
    /// Returns the failures; the other routed tracks still sound.
    pub fn attack<'a>(
        &mut self,
        degree: u8,
        routed: impl Iterator<Item = &'a InstrumentConfig>,
        builder: &Builder,
        at: f64,
    ) -> Vec<EngineError> {
        if let Some(key) = self.held.get_mut(degree as usize) {
            *key = true;
        }
        let mut failures = Vec::new();
        for config in routed {
            let transposed = transpose(config, degree);
            if let Err(e) = builder.fire_once(&transposed, at) {
                warn!("keyboard note {} dropped: {}", transposed.note, e);
                failures.push(e);
            }
        }
        failures
    }

    // attack-release pairs are fired whole, so there's nothing to stop here
    pub fn release(&mut self, degree: u8) {
        if let Some(key) = self.held.get_mut(degree as usize) {
            *key = false;
        }
    }
}

fn transpose(config: &InstrumentConfig, degree: u8) -> InstrumentConfig {
    let note = transpose_note(&config.note, degree as i32)
        .or_else(|| Pitch::C4.transpose(degree as i32).map(|p| p.to_string()))
        .unwrap_or_else(|| Pitch::C4.to_string());
    InstrumentConfig {
        note,
        ..config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::testing::{drain, sink, triggers};

    fn config(note: &str, routed: bool) -> InstrumentConfig {
        InstrumentConfig {
            note: note.into(),
            route_to_keyboard: routed,
            ..InstrumentConfig::default()
        }
    }

    #[test]
    fn test_key_degrees() {
        assert_eq!(key_degree('a'), Some(0));
        assert_eq!(key_degree('w'), Some(1));
        assert_eq!(key_degree('J'), Some(11));
        assert_eq!(key_degree('z'), None);
    }

    #[test]
    fn test_transpose_by_degree() {
        assert_eq!(transpose(&config("C4", true), 2).note, "D4");
        assert_eq!(transpose(&config("C4", true), 12).note, "C5");
        assert_eq!(transpose(&config("bogus", true), 4).note, "E4");
        // off the top of the MIDI range plays from C4 instead
        assert_eq!(transpose(&config("G9", true), 5).note, "F4");
    }

    #[test]
    fn test_attack_fires_only_routed() {
        let (sink, queue) = sink(8);
        let builder = Builder::new(sink, 120.0);
        let configs = [config("C4", true), config("G4", false), config("A4", true)];
        let routed = configs.iter().filter(|c| c.route_to_keyboard);

        let mut router = KeyboardRouter::new();
        let failures = router.attack(2, routed, &builder, 0.0);
        assert!(failures.is_empty());
        assert!(router.held()[2]);

        let fired = triggers(&drain(&queue));
        assert_eq!(fired.len(), 2);
        let d4 = "D4".parse::<Pitch>().unwrap().frequency();
        let b4 = "B4".parse::<Pitch>().unwrap().frequency();
        assert!((fired[0].frequency - d4).abs() < 0.01);
        assert!((fired[1].frequency - b4).abs() < 0.01);

        router.release(2);
        assert!(!router.held()[2]);
    }

    #[test]
    fn test_attack_reports_exhaustion() {
        let (sink, _queue) = sink(1);
        let builder = Builder::new(sink, 120.0);
        let configs = [config("C4", true), config("E4", true)];
        let mut router = KeyboardRouter::new();
        let failures = router.attack(0, configs.iter(), &builder, 0.0);
        assert_eq!(failures, vec![EngineError::Exhausted { capacity: 1 }]);
    }
}
