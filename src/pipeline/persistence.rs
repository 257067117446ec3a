// to be called on startup and quit; saves the track list and tempo so we can reload it later
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

use crate::pipeline::track::{ProjectState, TrackId};
use crate::shared::{PROJECT_DIR, PROJECT_FILE};

// <project_dir>/.rowsynth/project.json
fn project_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_DIR).join(PROJECT_FILE)
}

/// None when there's nothing usable on disk; the caller starts a fresh project.
pub fn load_project(project_dir: &Path) -> Option<ProjectState> {
    let path = project_file_path(project_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    let mut state: ProjectState = match serde_json::from_str(&data) {
        Ok(state) => state,
        Err(e) => {
            warn!("ignoring unreadable {}: {}", path.display(), e);
            return None;
        }
    };
    // ids saved last session stay unique for tracks added this session
    if let Some(max) = state.tracks.iter().map(|t| t.id).max() {
        TrackId::reserve_above(max);
    }
    // a hand-edited file can repeat an id; the reconciler needs them unique
    let mut seen = HashSet::new();
    for track in state.tracks.iter_mut() {
        if !seen.insert(track.id) {
            let fresh = TrackId::next();
            warn!("duplicate track id {} in {}; renumbered to {}", track.id, path.display(), fresh);
            track.id = fresh;
        }
    }
    Some(state)
}

// Save the project state to disk, making the directory if it doesn't exist already
pub fn save_project(project_dir: &Path, state: &ProjectState) -> anyhow::Result<()> {
    let path = project_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::builder::Builder;
    use crate::pipeline::reconciler::Reconciler;
    use crate::pipeline::track::{EffectConfig, EffectKind, Track, VoiceKind};

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ProjectState::default();
        state.bpm = 96.0;
        state.tracks[0].instrument.kind = VoiceKind::Membrane;
        state.tracks[0].instrument.effects.push(EffectConfig::new(EffectKind::Reverb));
        state.tracks[1].sequencer.toggle(5);

        save_project(dir.path(), &state).unwrap();
        let loaded = load_project(dir.path()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_missing_project_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project(dir.path()).is_none());
    }

    #[test]
    fn test_malformed_project_is_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        std::fs::write(project_file_path(dir.path()), "[1, 2").unwrap();
        assert!(load_project(dir.path()).is_none());
    }

    #[test]
    fn test_loaded_ids_are_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let mut track = Track::with_note("C4");
        track.id = TrackId(900_000);
        let state = ProjectState {
            tracks: vec![track],
            bpm: 120.0,
        };
        save_project(dir.path(), &state).unwrap();
        load_project(dir.path()).unwrap();
        assert!(TrackId::next().0 > 900_000);
    }

    #[test]
    fn test_duplicate_ids_renumbered_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = Track::with_note("C4");
        let mut second = Track::with_note("E4");
        first.id = TrackId(700_000);
        second.id = TrackId(700_000);
        let state = ProjectState {
            tracks: vec![first, second],
            bpm: 120.0,
        };
        save_project(dir.path(), &state).unwrap();
        let loaded = load_project(dir.path()).unwrap();
        assert_eq!(loaded.tracks[0].id, TrackId(700_000));
        assert_ne!(loaded.tracks[1].id, TrackId(700_000));
        assert_eq!(loaded.tracks[1].instrument.note, "E4");

        // with unique ids a second identical reconcile rebuilds nothing
        let (sink, _queue) = crate::audio_api::testing::sink(8);
        let mut reconciler = Reconciler::new(Builder::new(sink, 120.0));
        assert_eq!(reconciler.reconcile(&loaded.tracks).built.len(), 2);
        let again = reconciler.reconcile(&loaded.tracks);
        assert!(again.built.is_empty());
        assert_eq!(again.disposed, 0);
    }

    #[test]
    fn test_default_project_has_seven_tracks() {
        let state = ProjectState::default();
        let notes: Vec<&str> = state.tracks.iter().map(|t| t.instrument.note.as_str()).collect();
        assert_eq!(notes, vec!["C4", "D4", "E4", "F4", "G4", "A5", "B5"]);
        assert_eq!(state.bpm, 180.0);
    }
}
