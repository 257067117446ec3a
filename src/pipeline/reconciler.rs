use std::collections::HashMap;

use tracing::{debug, warn};

use crate::audio_api::EngineError;

use super::builder::Builder;
use super::instrument::InstrumentHandle;
use super::track::{InstrumentConfig, SequenceState, Track, TrackId};

struct Slot {
    id: TrackId,
    fingerprint: String,
    instrument: InstrumentConfig,
    sequencer: SequenceState,
    handle: Option<InstrumentHandle>, // None after a failed build; retried next reconcile
}

/// What one `reconcile` call did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub built: Vec<TrackId>,
    pub kept: Vec<TrackId>,
    pub disposed: usize,
    pub failures: Vec<(TrackId, EngineError)>,
}

/// Keeps one built instrument per track, in track order, rebuilding only
/// the ones whose instrument config actually changed.
///
/// Slots are matched to tracks by id, so removing or reordering tracks in
/// the middle of the list never hands a track someone else's instrument.
pub struct Reconciler {
    builder: Builder,
    slots: Vec<Slot>,
}

impl Reconciler {
    pub fn new(builder: Builder) -> Self {
        Self {
            builder,
            slots: Vec::new(),
        }
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut Builder {
        &mut self.builder
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn reconcile(&mut self, tracks: &[Track]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut previous: HashMap<TrackId, Slot> = self.slots.drain(..).map(|s| (s.id, s)).collect();

        // release removed tracks first so their room in the engine is free for the builds below
        let gone: Vec<TrackId> = previous
            .keys()
            .filter(|id| !tracks.iter().any(|t| t.id == **id))
            .copied()
            .collect();
        for id in gone {
            if let Some(mut slot) = previous.remove(&id) {
                if let Some(mut handle) = slot.handle.take() {
                    handle.dispose();
                    report.disposed += 1;
                }
                debug!("track {} removed", id);
            }
        }

        for track in tracks {
            let fingerprint = track.instrument.fingerprint();
            let old = previous.remove(&track.id);

            let unchanged = matches!(&old, Some(s) if s.fingerprint == fingerprint && s.handle.is_some());
            let handle = if unchanged {
                report.kept.push(track.id);
                old.and_then(|s| s.handle)
            } else {
                if let Some(mut handle) = old.and_then(|s| s.handle) {
                    handle.dispose();
                    report.disposed += 1;
                }
                match self.builder.build(&track.instrument) {
                    Ok(handle) => {
                        debug!("track {} built as {:?}", track.id, handle.id());
                        report.built.push(track.id);
                        Some(handle)
                    }
                    Err(e) => {
                        warn!("track {} left silent: {}", track.id, e);
                        report.failures.push((track.id, e));
                        None
                    }
                }
            };

            self.slots.push(Slot {
                id: track.id,
                fingerprint,
                instrument: track.instrument.clone(),
                sequencer: track.sequencer.clone(),
                handle,
            });
        }

        // duplicate ids leave stale slots behind
        for (_, mut slot) in previous.drain() {
            if let Some(mut handle) = slot.handle.take() {
                handle.dispose();
                report.disposed += 1;
            }
        }

        debug_assert_eq!(self.slots.len(), tracks.len(), "slot list out of step with tracks");
        report
    }

    /// Tracks in order, with the instrument to fire (None while silent).
    pub fn live(&self) -> impl Iterator<Item = (&SequenceState, Option<&InstrumentHandle>)> {
        self.slots.iter().map(|s| (&s.sequencer, s.handle.as_ref()))
    }

    pub fn handle(&self, id: TrackId) -> Option<&InstrumentHandle> {
        self.slots.iter().find(|s| s.id == id).and_then(|s| s.handle.as_ref())
    }

    pub fn is_silent(&self, id: TrackId) -> bool {
        self.slots.iter().any(|s| s.id == id && s.handle.is_none())
    }

    /// Instrument configs of the tracks listening to the keyboard.
    pub fn routed(&self) -> impl Iterator<Item = &InstrumentConfig> {
        self.slots.iter().map(|s| &s.instrument).filter(|i| i.route_to_keyboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::testing::{drain, installed, removed, sink};
    use crate::audio_api::{CommandQueue, InstrumentId};
    use crate::pipeline::track::{EffectConfig, EffectKind, VoiceKind};

    fn reconciler(capacity: usize) -> (Reconciler, CommandQueue) {
        let (sink, queue) = sink(capacity);
        (Reconciler::new(Builder::new(sink, 120.0)), queue)
    }

    fn tracks(n: usize) -> Vec<Track> {
        (0..n).map(|i| Track::with_note(["C4", "D4", "E4", "F4", "G4"][i % 5])).collect()
    }

    fn handle_ids(r: &Reconciler) -> Vec<Option<InstrumentId>> {
        r.live().map(|(_, h)| h.map(|h| h.id())).collect()
    }

    #[test]
    fn test_identical_lists_rebuild_nothing() {
        let (mut r, queue) = reconciler(16);
        let list = tracks(3);
        assert_eq!(r.reconcile(&list).built.len(), 3);
        let before = handle_ids(&r);
        drain(&queue);

        let report = r.reconcile(&list);
        assert!(report.built.is_empty());
        assert_eq!(report.kept.len(), 3);
        assert_eq!(report.disposed, 0);
        assert_eq!(handle_ids(&r), before);
        assert!(drain(&queue).is_empty());
    }

    #[test]
    fn test_sequence_edit_keeps_handle() {
        let (mut r, _queue) = reconciler(16);
        let mut list = tracks(2);
        r.reconcile(&list);
        let before = handle_ids(&r);

        list[1].sequencer.toggle(3);
        list[1].sequencer.set_steps(12);
        let report = r.reconcile(&list);
        assert!(report.built.is_empty());
        assert_eq!(handle_ids(&r), before);
        let (seq, _) = r.live().nth(1).unwrap();
        assert_eq!(seq.steps, 12);
        assert!(seq.sequence[3]);
    }

    #[test]
    fn test_instrument_edit_rebuilds_only_that_track() {
        let (mut r, queue) = reconciler(16);
        let mut list = tracks(3);
        r.reconcile(&list);
        let before = handle_ids(&r);
        drain(&queue);

        list[1].instrument.kind = VoiceKind::Metal;
        let report = r.reconcile(&list);
        assert_eq!(report.built, vec![list[1].id]);
        assert_eq!(report.disposed, 1);

        let after = handle_ids(&r);
        assert_eq!(after[0], before[0]);
        assert_ne!(after[1], before[1]);
        assert_eq!(after[2], before[2]);

        let cmds = drain(&queue);
        assert_eq!(removed(&cmds), vec![before[1].unwrap()]);
        assert_eq!(installed(&cmds).len(), 1);
    }

    #[test]
    fn test_effect_edit_rebuilds() {
        let (mut r, _queue) = reconciler(16);
        let mut list = tracks(1);
        r.reconcile(&list);
        list[0].instrument.effects.push(EffectConfig::new(EffectKind::Delay));
        assert_eq!(r.reconcile(&list).built.len(), 1);
    }

    #[test]
    fn test_shrink_disposes_trailing() {
        let (mut r, queue) = reconciler(16);
        let list = tracks(5);
        r.reconcile(&list);
        let before = handle_ids(&r);
        drain(&queue);

        let report = r.reconcile(&list[..2]);
        assert_eq!(report.disposed, 3);
        assert_eq!(report.kept.len(), 2);
        assert_eq!(r.len(), 2);
        assert_eq!(handle_ids(&r), before[..2].to_vec());

        let mut gone = removed(&drain(&queue));
        gone.sort_by_key(|id| id.0);
        let mut expected: Vec<InstrumentId> = before[2..].iter().flatten().copied().collect();
        expected.sort_by_key(|id| id.0);
        assert_eq!(gone, expected);
    }

    #[test]
    fn test_middle_removal_keeps_the_rest() {
        let (mut r, _queue) = reconciler(16);
        let mut list = tracks(4);
        r.reconcile(&list);
        let before = handle_ids(&r);

        list.remove(1);
        let report = r.reconcile(&list);
        assert!(report.built.is_empty());
        assert_eq!(report.disposed, 1);
        assert_eq!(handle_ids(&r), vec![before[0], before[2], before[3]]);
    }

    #[test]
    fn test_reorder_follows_ids() {
        let (mut r, _queue) = reconciler(16);
        let mut list = tracks(3);
        r.reconcile(&list);
        let first = r.handle(list[0].id).map(|h| h.id());

        list.swap(0, 2);
        let report = r.reconcile(&list);
        assert!(report.built.is_empty());
        assert_eq!(handle_ids(&r)[2], first);
    }

    #[test]
    fn test_exhaustion_leaves_track_silent_and_retries() {
        let (mut r, _queue) = reconciler(2);
        let mut list = tracks(3);
        let report = r.reconcile(&list);
        assert_eq!(report.built.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].1, EngineError::Exhausted { .. }));
        assert_eq!(r.len(), 3);
        assert!(r.is_silent(list[2].id));

        // freeing room lets the silent track build on the next pass
        list.remove(0);
        let report = r.reconcile(&list);
        assert_eq!(report.built, vec![list[1].id]);
        assert!(report.failures.is_empty());
        assert!(!r.is_silent(list[1].id));
    }

    #[test]
    fn test_routed_configs() {
        let (mut r, _queue) = reconciler(16);
        let mut list = tracks(3);
        list[1].instrument.route_to_keyboard = true;
        r.reconcile(&list);
        let routed: Vec<&str> = r.routed().map(|i| i.note.as_str()).collect();
        assert_eq!(routed, vec!["D4"]);
    }
}
