// The command protocol between the control side (reconciler, scheduler,
// keyboard) and the audio thread. Everything heavy is built on the control
// side and moved across; the engine only installs, triggers and drops.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use tracing::{error, warn};

pub use crate::audio::{AudioClock, Chain, InstrumentId};

// how long a removal may wait on a full queue before giving up
const REMOVE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerParams {
    pub id: InstrumentId,
    pub at_frame: u64, // absolute frame on the audio clock
    pub frequency: f32,
    pub gate_frames: u64,
}

#[derive(Debug)]
pub enum AudioCommand {
    Install {
        id: InstrumentId,
        chain: Box<Chain>,
        oneshot: bool, // engine frees it by itself once it has played and gone quiet
    },
    Trigger(TriggerParams),
    Remove(InstrumentId),
}

/// Failures from the engine side while building; the rest of the pipeline keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Exhausted { capacity: usize },
    QueueFull,
    Disconnected,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Exhausted { capacity } => {
                write!(f, "instrument table full ({} instruments)", capacity)
            }
            EngineError::QueueFull => write!(f, "audio command queue full"),
            EngineError::Disconnected => write!(f, "audio engine is gone"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Control-side end of the command channel.
///
/// `live` counts instruments installed and not yet removed, plus oneshots the
/// engine hasn't retired. Installs beyond `capacity` are refused.
#[derive(Clone, Debug)]
pub struct CommandSink {
    tx: Sender<AudioCommand>,
    live: Arc<AtomicUsize>,
    capacity: usize,
    clock: AudioClock,
}

/// Engine-side end of the command channel.
pub struct CommandQueue {
    pub rx: Receiver<AudioCommand>,
    pub live: Arc<AtomicUsize>, // the engine gives back room for oneshots it retires
}

pub fn command_channel(clock: AudioClock, capacity: usize, queue_len: usize) -> (CommandSink, CommandQueue) {
    let (tx, rx) = crossbeam_channel::bounded(queue_len.max(1));
    let live = Arc::new(AtomicUsize::new(0));
    let sink = CommandSink {
        tx,
        live: Arc::clone(&live),
        capacity,
        clock,
    };
    (sink, CommandQueue { rx, live })
}

impl CommandSink {
    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    pub fn live_instruments(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn install(&self, id: InstrumentId, chain: Chain, oneshot: bool) -> Result<(), EngineError> {
        let capacity = self.capacity;
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < capacity).then_some(n + 1))
            .map_err(|_| EngineError::Exhausted { capacity })?;

        let cmd = AudioCommand::Install {
            id,
            chain: Box::new(chain),
            oneshot,
        };
        self.tx.try_send(cmd).map_err(|e| {
            self.live.fetch_sub(1, Ordering::AcqRel);
            match e {
                TrySendError::Full(_) => EngineError::QueueFull,
                TrySendError::Disconnected(_) => EngineError::Disconnected,
            }
        })
    }

    // a missed trigger is a dropped note, not a failure
    pub fn trigger(&self, params: TriggerParams) -> bool {
        match self.tx.try_send(AudioCommand::Trigger(params)) {
            Ok(()) => true,
            Err(e) => {
                warn!("dropped trigger for {:?}: {}", params.id, e);
                false
            }
        }
    }

    // removal must get through, so it may wait briefly for room in the queue.
    // the room is given back right away so a rebuild in the same pass can use it
    pub fn remove(&self, id: InstrumentId) {
        let _ = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match self.tx.send_timeout(AudioCommand::Remove(id), REMOVE_TIMEOUT) {
            Ok(()) => {}
            Err(SendTimeoutError::Disconnected(_)) => {} // engine gone, nothing left to free
            Err(SendTimeoutError::Timeout(_)) => {
                error!("could not release {:?}: audio command queue stuck", id);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::audio::next_instrument_id;

    #[test]
    fn test_install_respects_capacity() {
        let (sink, _queue) = sink(2);
        assert!(sink.install(next_instrument_id(), chain(), false).is_ok());
        assert!(sink.install(next_instrument_id(), chain(), false).is_ok());
        assert_eq!(
            sink.install(next_instrument_id(), chain(), false),
            Err(EngineError::Exhausted { capacity: 2 })
        );
        assert_eq!(sink.live_instruments(), 2);
    }

    #[test]
    fn test_full_queue_rolls_back_reservation() {
        let (sink, _queue) = command_channel(AudioClock::new(8000), 8, 1);
        assert!(sink.install(next_instrument_id(), chain(), false).is_ok());
        assert_eq!(
            sink.install(next_instrument_id(), chain(), false),
            Err(EngineError::QueueFull)
        );
        assert_eq!(sink.live_instruments(), 1);
    }

    #[test]
    fn test_disconnected_engine() {
        let (sink, queue) = sink(4);
        drop(queue);
        assert_eq!(
            sink.install(next_instrument_id(), chain(), false),
            Err(EngineError::Disconnected)
        );
        sink.remove(next_instrument_id()); // must not block or panic
    }
}
