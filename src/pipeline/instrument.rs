use crate::audio_api::{CommandSink, InstrumentId, TriggerParams};

use super::pitch::NoteLength;

/// Owns one voice + effect chain living inside the engine.
///
/// The handle remembers its note and length so the scheduler can fire it with
/// nothing but a timestamp. Dropping the handle releases the engine side.
#[derive(Debug)]
pub struct InstrumentHandle {
    id: InstrumentId,
    sink: CommandSink,
    frequency: f32,
    length: NoteLength,
    note: String,
    disposed: bool,
}

impl InstrumentHandle {
    pub(crate) fn new(id: InstrumentId, sink: CommandSink, frequency: f32, length: NoteLength, note: String) -> Self {
        Self {
            id,
            sink,
            frequency,
            length,
            note,
            disposed: false,
        }
    }

    pub fn id(&self) -> InstrumentId {
        self.id
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Play the configured note starting at `at` seconds on the audio clock.
    /// The release follows after the note length at `bpm`.
    pub fn trigger(&self, at: f64, bpm: f32) -> bool {
        if self.disposed {
            return false;
        }
        let clock = self.sink.clock();
        self.sink.trigger(TriggerParams {
            id: self.id,
            at_frame: clock.frame_at(at),
            frequency: self.frequency,
            gate_frames: clock.frames_for(self.length.seconds(bpm)).max(1),
        })
    }

    // safe to call any number of times; only the first reaches the engine
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.sink.remove(self.id);
        }
    }
}

impl Drop for InstrumentHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::next_instrument_id;
    use crate::audio_api::testing::{drain, removed, sink, triggers};

    fn handle(sink: &CommandSink) -> InstrumentHandle {
        InstrumentHandle::new(next_instrument_id(), sink.clone(), 440.0, NoteLength::eighth(), "A4".into())
    }

    #[test]
    fn test_trigger_stamps_audio_frame() {
        let (sink, queue) = sink(4);
        let h = handle(&sink);
        assert!(h.trigger(0.5, 120.0));
        let fired = triggers(&drain(&queue));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].at_frame, 4000); // clock runs at 8 kHz
        assert_eq!(fired[0].gate_frames, 2000); // eighth at 120 bpm
        assert_eq!(fired[0].frequency, 440.0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (sink, queue) = sink(4);
        let mut h = handle(&sink);
        let id = h.id();
        h.dispose();
        h.dispose();
        drop(h);
        assert_eq!(removed(&drain(&queue)), vec![id]);
    }

    #[test]
    fn test_disposed_handle_is_silent() {
        let (sink, queue) = sink(4);
        let mut h = handle(&sink);
        h.dispose();
        assert!(!h.trigger(0.0, 120.0));
        assert!(triggers(&drain(&queue)).is_empty());
    }

    #[test]
    fn test_drop_releases() {
        let (sink, queue) = sink(4);
        let id = {
            let h = handle(&sink);
            h.id()
        };
        assert_eq!(removed(&drain(&queue)), vec![id]);
    }
}
