// The middle layer: owns the canonical track list, turns semantic input events
// into edits, and pushes every edit through the pipeline. The TUI never touches
// the pipeline directly; it draws whatever display_state() says.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::pipeline::parser::{format_track, parse_track};
use crate::pipeline::track::{InstrumentConfig, ProjectState, Track};
use crate::pipeline::transport::Transport;
use crate::shared::{BPM_NUDGE, DisplayState, Direction, InputEvent, MAX_BPM, MIN_BPM, Mode, TrackRow};

const NO_STEP: u64 = u64::MAX;

pub struct Middle {
    pub state: ProjectState,
    transport: Transport,
    last_step: Arc<AtomicU64>, // written by the scheduler thread through on_step
    mode: Mode,
    cursor_row: usize,
    cursor_step: usize,
    edit_buffer: String,
    edit_original: Option<Track>, // the track as it was when editing began
    status: String,
}

impl Middle {
    pub fn new(state: ProjectState, mut pipeline: Pipeline, poll_interval: Duration) -> Self {
        let last_step = Arc::new(AtomicU64::new(NO_STEP));
        let step = Arc::clone(&last_step);
        pipeline.set_on_step(move |t| step.store(t, Ordering::Release));
        pipeline.set_tempo(state.bpm);

        let mut middle = Self {
            state,
            transport: Transport::spawn(pipeline, poll_interval),
            last_step,
            mode: Mode::Grid,
            cursor_row: 0,
            cursor_step: 0,
            edit_buffer: String::new(),
            edit_original: None,
            status: String::new(),
        };
        middle.apply();
        middle
    }

    // push the current track list into the pipeline
    fn apply(&mut self) {
        let report = self.transport.pipeline().reconcile(&self.state.tracks);
        self.status = match report.failures.first() {
            Some((id, e)) => format!("track {} silent: {}", id, e),
            None if !report.built.is_empty() => format!("built {}", report.built.len()),
            None => String::new(),
        };
    }

    /// Returns true when the host should save and exit.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Quit => return true,
            InputEvent::MoveCursor(dir) => self.move_cursor(dir),
            InputEvent::ToggleStep => {
                let step = self.cursor_step;
                if let Some(track) = self.current_track_mut() {
                    track.sequencer.toggle(step);
                    self.apply();
                }
            }
            InputEvent::ToggleRoute => {
                if let Some(track) = self.current_track_mut() {
                    track.instrument.route_to_keyboard = !track.instrument.route_to_keyboard;
                    self.apply();
                }
            }
            InputEvent::AddTrack => self.add_track(),
            InputEvent::RemoveTrack => self.remove_track(),
            InputEvent::PlayPress => self.play_press(),
            InputEvent::NudgeBpm(delta) => {
                self.state.bpm = (self.state.bpm + delta).clamp(MIN_BPM, MAX_BPM);
                self.transport.pipeline().set_tempo(self.state.bpm);
            }
            InputEvent::BeginEdit => self.begin_edit(),
            InputEvent::EditChar(c) => {
                if self.mode == Mode::Edit {
                    self.edit_buffer.push(c);
                    self.reparse();
                }
            }
            InputEvent::EditBackspace => {
                if self.mode == Mode::Edit {
                    self.edit_buffer.pop();
                    self.reparse();
                }
            }
            InputEvent::CommitEdit => {
                self.edit_original = None;
                self.mode = Mode::Grid;
            }
            InputEvent::CancelEdit => {
                if let Some(original) = self.edit_original.take() {
                    if let Some(track) = self.current_track_mut() {
                        *track = original;
                    }
                    self.apply();
                }
                self.mode = Mode::Grid;
            }
            InputEvent::KeyDown(degree) => {
                let failures = self.transport.pipeline().attack(degree);
                if let Some(e) = failures.first() {
                    self.status = format!("keyboard: {}", e);
                }
            }
            InputEvent::KeyUp(degree) => self.transport.pipeline().release(degree),
            InputEvent::ToggleKeyboardMode => {
                self.mode = match self.mode {
                    Mode::Keyboard => Mode::Grid,
                    _ => Mode::Keyboard,
                };
            }
        }
        false
    }

    fn current_track_mut(&mut self) -> Option<&mut Track> {
        self.state.tracks.get_mut(self.cursor_row)
    }

    fn move_cursor(&mut self, dir: Direction) {
        let rows = self.state.tracks.len();
        match dir {
            Direction::Up => self.cursor_row = self.cursor_row.saturating_sub(1),
            Direction::Down => self.cursor_row = (self.cursor_row + 1).min(rows.saturating_sub(1)),
            Direction::Left => self.cursor_step = self.cursor_step.saturating_sub(1),
            Direction::Right => self.cursor_step += 1,
        }
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        self.cursor_row = self.cursor_row.min(self.state.tracks.len().saturating_sub(1));
        let steps = self
            .state
            .tracks
            .get(self.cursor_row)
            .map(|t| t.sequencer.steps)
            .unwrap_or(1);
        self.cursor_step = self.cursor_step.min(steps - 1);
    }

    // new track goes under the cursor, sounding like the one it was added from
    fn add_track(&mut self) {
        let instrument = self
            .state
            .tracks
            .get(self.cursor_row)
            .map(|t| InstrumentConfig {
                route_to_keyboard: false,
                ..t.instrument.clone()
            })
            .unwrap_or_default();
        let track = Track::new(instrument);
        info!("adding track {}", track.id);
        let at = (self.cursor_row + 1).min(self.state.tracks.len());
        self.state.tracks.insert(at, track);
        self.cursor_row = at;
        self.apply();
        self.clamp_cursor();
    }

    fn remove_track(&mut self) {
        if self.cursor_row >= self.state.tracks.len() {
            return;
        }
        let track = self.state.tracks.remove(self.cursor_row);
        info!("removing track {}", track.id);
        self.apply();
        self.clamp_cursor();
    }

    fn play_press(&mut self) {
        let mut pipeline = self.transport.pipeline();
        if pipeline.is_playing() {
            pipeline.pause();
        } else if pipeline.counter().is_none() {
            pipeline.start();
        } else {
            pipeline.resume();
        }
    }

    fn begin_edit(&mut self) {
        let Some(track) = self.state.tracks.get(self.cursor_row) else {
            warn!("nothing to edit");
            return;
        };
        self.edit_buffer = format_track(track);
        self.edit_original = Some(track.clone());
        self.mode = Mode::Edit;
    }

    // every keystroke re-reads the whole line on top of the track as it was before editing
    fn reparse(&mut self) {
        let Some(original) = self.edit_original.as_ref() else {
            return;
        };
        let next = parse_track(original, &self.edit_buffer);
        if let Some(track) = self.state.tracks.get_mut(self.cursor_row) {
            if *track != next {
                *track = next;
                self.apply();
            }
        }
        self.clamp_cursor();
    }

    pub fn display_state(&self) -> DisplayState {
        let pipeline = self.transport.pipeline();
        let rows = self
            .state
            .tracks
            .iter()
            .map(|t| TrackRow {
                text: format_track(t),
                steps: t.sequencer.visible().collect(),
                routed: t.instrument.route_to_keyboard,
                failed: pipeline.is_silent(t.id),
            })
            .collect();
        let last = self.last_step.load(Ordering::Acquire);

        DisplayState {
            rows,
            counter: (last != NO_STEP).then_some(last),
            bpm: self.state.bpm,
            playing: pipeline.is_playing(),
            mode: self.mode,
            cursor_row: self.cursor_row,
            cursor_step: self.cursor_step,
            edit_buffer: self.edit_buffer.clone(),
            held_keys: pipeline.held_keys(),
            status: self.status.clone(),
        }
    }
}

pub fn nudge_for(up: bool) -> f32 {
    if up { BPM_NUDGE } else { -BPM_NUDGE }
}
