use std::sync::atomic::Ordering;

use crate::audio_api::{AudioCommand, CommandQueue, TriggerParams};

use super::chain::Chain;
use super::clock::AudioClock;
use super::frame::StereoFrame;
use super::instrument_id::InstrumentId;

const MAX_PENDING: usize = 4096; // triggers waiting for their frame; preallocated

struct Slot {
    id: InstrumentId,
    chain: Box<Chain>,
    oneshot: bool,
    fired: bool,
}

/// Lives on the audio thread. Owns every installed chain and renders them
/// against the audio clock.
pub struct Engine {
    queue: CommandQueue,
    clock: AudioClock,
    slots: Vec<Slot>,
    pending: Vec<TriggerParams>,
    scratch: Vec<StereoFrame>,
}

impl Engine {
    pub fn new(queue: CommandQueue, clock: AudioClock, max_instruments: usize) -> Self {
        Self {
            queue,
            clock,
            slots: Vec::with_capacity(max_instruments),
            pending: Vec::with_capacity(MAX_PENDING),
            scratch: Vec::new(),
        }
    }

    pub fn instrument_count(&self) -> usize {
        self.slots.len()
    }

    pub fn drain_commands(&mut self) {
        while let Ok(cmd) = self.queue.rx.try_recv() {
            self.handle_cmd(cmd);
        }
    }

    fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Install { id, chain, oneshot } => self.slots.push(Slot {
                id,
                chain,
                oneshot,
                fired: false,
            }),
            AudioCommand::Trigger(t) => {
                if self.pending.len() < MAX_PENDING {
                    self.pending.push(t);
                }
            }
            AudioCommand::Remove(id) => {
                // the sink already gave the room back
                if let Some(i) = self.slots.iter().position(|s| s.id == id) {
                    self.slots.swap_remove(i);
                }
            }
        }
    }

    /// Render one block starting at the current clock position, then advance the clock.
    ///
    /// Each chain is rendered in pieces split at its trigger offsets so notes start
    /// on their exact frame. Triggers already in the past start at the block head.
    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        let n = out.len();
        let start = self.clock.frames();
        let end = start + n as u64;

        out.fill(StereoFrame::zero());
        if self.scratch.len() < n {
            self.scratch.resize(n, StereoFrame::zero());
        }
        self.pending.sort_unstable_by_key(|t| t.at_frame);

        let Engine {
            slots,
            pending,
            scratch,
            ..
        } = self;
        let buf = &mut scratch[..n];

        for slot in slots.iter_mut() {
            let mut cursor = 0;
            for trig in pending.iter().filter(|t| t.id == slot.id && t.at_frame < end) {
                let offset = (trig.at_frame.saturating_sub(start) as usize).min(n);
                if offset > cursor {
                    slot.chain.render(&mut buf[cursor..offset]);
                    cursor = offset;
                }
                slot.chain.note_on(trig.frequency, trig.gate_frames);
                slot.fired = true;
            }
            slot.chain.render(&mut buf[cursor..]);
            for (o, s) in out.iter_mut().zip(buf.iter()) {
                *o += *s;
            }
        }
        pending.retain(|t| t.at_frame >= end);

        let before = slots.len();
        slots.retain(|s| !(s.oneshot && s.fired && s.chain.is_finished()));
        let retired = before - slots.len();
        if retired > 0 {
            self.queue.live.fetch_sub(retired, Ordering::AcqRel);
        }

        for f in out.iter_mut() {
            f.left = soft_clip(f.left);
            f.right = soft_clip(f.right);
        }
        self.clock.advance(n as u64);
    }
}

// gentle tanh knee above full scale
fn soft_clip(sample: f32) -> f32 {
    if sample.abs() <= 1.0 {
        sample
    } else {
        sample.signum() * (1.0 + (sample.abs() - 1.0).tanh() * 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::next_instrument_id;
    use crate::audio_api::testing::{chain, sink};

    const BLOCK: usize = 64;

    fn first_sound(out: &[StereoFrame]) -> Option<usize> {
        out.iter().position(|f| f.peak() > 0.0)
    }

    #[test]
    fn test_trigger_is_sample_accurate() {
        let (sink, queue) = sink(4);
        let clock = sink.clock().clone();
        let mut engine = Engine::new(queue, clock.clone(), 4);
        let id = next_instrument_id();
        sink.install(id, chain(), false).unwrap();
        sink.trigger(TriggerParams {
            id,
            at_frame: 100,
            frequency: 440.0,
            gate_frames: 400,
        });
        engine.drain_commands();

        let mut out = vec![StereoFrame::zero(); BLOCK];
        engine.render_block(&mut out); // frames 0..64
        assert_eq!(first_sound(&out), None);
        engine.render_block(&mut out); // frames 64..128
        // attack and sine phase both start at zero, so sound begins one frame after the onset
        assert_eq!(first_sound(&out), Some(100 - 64 + 1));
        assert_eq!(clock.frames(), 128);
    }

    #[test]
    fn test_late_trigger_plays_at_block_start() {
        let (sink, queue) = sink(4);
        let mut engine = Engine::new(queue, sink.clock().clone(), 4);
        let id = next_instrument_id();
        sink.install(id, chain(), false).unwrap();
        engine.drain_commands();
        let mut out = vec![StereoFrame::zero(); BLOCK];
        engine.render_block(&mut out);

        sink.trigger(TriggerParams {
            id,
            at_frame: 3,
            frequency: 440.0,
            gate_frames: 400,
        });
        engine.drain_commands();
        engine.render_block(&mut out);
        assert_eq!(first_sound(&out), Some(1));
    }

    #[test]
    fn test_remove_frees_slot() {
        let (sink, queue) = sink(4);
        let mut engine = Engine::new(queue, sink.clock().clone(), 4);
        let id = next_instrument_id();
        sink.install(id, chain(), false).unwrap();
        engine.drain_commands();
        assert_eq!(engine.instrument_count(), 1);
        sink.remove(id);
        engine.drain_commands();
        assert_eq!(engine.instrument_count(), 0);
        assert_eq!(sink.live_instruments(), 0);
    }

    #[test]
    fn test_oneshot_retires_after_release() {
        let (sink, queue) = sink(4);
        let mut engine = Engine::new(queue, sink.clock().clone(), 4);
        let id = next_instrument_id();
        sink.install(id, chain(), true).unwrap();
        sink.trigger(TriggerParams {
            id,
            at_frame: 0,
            frequency: 440.0,
            gate_frames: 80,
        });
        engine.drain_commands();

        // sine release is 1s at 8 kHz
        let mut out = vec![StereoFrame::zero(); BLOCK];
        for _ in 0..(8000 / BLOCK + 10) {
            engine.render_block(&mut out);
        }
        assert_eq!(engine.instrument_count(), 0);
        assert_eq!(sink.live_instruments(), 0);
    }

    #[test]
    fn test_oneshot_kept_until_fired() {
        let (sink, queue) = sink(4);
        let mut engine = Engine::new(queue, sink.clock().clone(), 4);
        sink.install(next_instrument_id(), chain(), true).unwrap();
        engine.drain_commands();
        let mut out = vec![StereoFrame::zero(); BLOCK];
        engine.render_block(&mut out);
        assert_eq!(engine.instrument_count(), 1);
    }

    #[test]
    fn test_soft_clip() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert!(soft_clip(4.0) < 1.5);
        assert!(soft_clip(-4.0) > -1.5);
    }
}
