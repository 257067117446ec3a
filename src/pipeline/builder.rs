// turns an InstrumentConfig into a chain inside the engine

use tracing::debug;

use crate::audio::{Chain, Voice, build_effect, next_instrument_id};
use crate::audio_api::{CommandSink, EngineError, TriggerParams};

use super::instrument::InstrumentHandle;
use super::pitch::{NoteLength, Pitch};
use super::track::InstrumentConfig;

const FALLBACK_NOTE: &str = "C4";

pub struct Builder {
    sink: CommandSink,
    bpm: f32, // delay times are fixed to the tempo at build time
}

struct Resolved {
    chain: Chain,
    frequency: f32,
    length: NoteLength,
    note: String,
}

impl Builder {
    pub fn new(sink: CommandSink, bpm: f32) -> Self {
        Self { sink, bpm }
    }

    pub fn sink(&self) -> &CommandSink {
        &self.sink
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        self.bpm = bpm;
    }

    /// Build and install a persistent instrument. Only engine-side failures
    /// (table full, queue full, engine gone) are errors; bad config values fall back.
    pub fn build(&self, config: &InstrumentConfig) -> Result<InstrumentHandle, EngineError> {
        let Resolved {
            chain,
            frequency,
            length,
            note,
        } = self.resolve(config);
        let id = next_instrument_id();
        self.sink.install(id, chain, false)?;
        Ok(InstrumentHandle::new(id, self.sink.clone(), frequency, length, note))
    }

    /// Build a transient copy of `config` and play it once at `at`. The engine
    /// frees it after the note and its effect tails have died away.
    pub fn fire_once(&self, config: &InstrumentConfig, at: f64) -> Result<(), EngineError> {
        let Resolved {
            chain,
            frequency,
            length,
            ..
        } = self.resolve(config);
        let id = next_instrument_id();
        self.sink.install(id, chain, true)?;

        let clock = self.sink.clock();
        let sent = self.sink.trigger(TriggerParams {
            id,
            at_frame: clock.frame_at(at),
            frequency,
            gate_frames: clock.frames_for(length.seconds(self.bpm)).max(1),
        });
        if !sent {
            // never fires, so the engine would never retire it
            self.sink.remove(id);
            return Err(EngineError::QueueFull);
        }
        Ok(())
    }

    fn resolve(&self, config: &InstrumentConfig) -> Resolved {
        let sample_rate = self.sink.clock().sample_rate() as f32;

        // a pitch at or above nyquist only aliases, so it plays as the fallback too
        let nyquist = sample_rate / 2.0;
        let (pitch, note) = match config.note.parse::<Pitch>() {
            Ok(p) if p.frequency().is_finite() && p.frequency() < nyquist => (p, config.note.clone()),
            Ok(p) => {
                debug!("{} is above {} Hz; using {}", p, nyquist, FALLBACK_NOTE);
                (Pitch::C4, FALLBACK_NOTE.to_string())
            }
            Err(e) => {
                debug!("{}; using {}", e, FALLBACK_NOTE);
                (Pitch::C4, FALLBACK_NOTE.to_string())
            }
        };
        let length = config.duration.parse::<NoteLength>().unwrap_or_else(|_| NoteLength::eighth());

        let effects = config
            .effects
            .iter()
            .filter_map(|fx| build_effect(&fx.kind, sample_rate, self.bpm))
            .collect();
        let chain = Chain::new(Voice::new(config.kind, sample_rate), effects, config.gain);

        Resolved {
            chain,
            frequency: pitch.frequency(),
            length,
            note,
        }
    }
}
