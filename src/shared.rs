// Types shared between the terminal surface and the middle layer.
//
// Grid mode:
//   arrows        //  MoveCursor
//   Space         //  ToggleStep
//   Enter         //  BeginEdit, then typed chars edit the track line live
//                 //  (Enter commits, Esc restores the line as it was)
//   k             //  ToggleRoute (listen to keyboard)
//   n / x         //  AddTrack / RemoveTrack
//   p             //  PlayPress (pause / resume)
//   + / -         //  NudgeBpm
//   Tab           //  ToggleKeyboardMode
//   Esc           //  Quit
//
// Keyboard mode:
//   a w s e d f t g y h u j   //  KeyDown(degree) / KeyUp(degree), one semitone apart
//   Tab                       //  back to grid mode
//
// The middle layer owns the track list and the pipeline; the TUI only reads a
// DisplayState each frame and draws it.

pub const DEFAULT_STEPS: usize = 16;
pub const MAX_STEPS: usize = 64;
pub const DEFAULT_BPM: f32 = 180.0;
pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 400.0;
pub const BPM_NUDGE: f32 = 5.0;

pub const NUM_KEYS: usize = 12;
pub const KEYBOARD_KEYS: [char; NUM_KEYS] = ['a', 'w', 's', 'e', 'd', 'f', 't', 'g', 'y', 'h', 'u', 'j'];

// everything rowsynth writes lives in <project>/.rowsynth/
pub const PROJECT_DIR: &str = ".rowsynth";
pub const PROJECT_FILE: &str = "project.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "rowsynth.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    // grid mode
    MoveCursor(Direction),
    ToggleStep,
    ToggleRoute,
    AddTrack,
    RemoveTrack,
    PlayPress,
    NudgeBpm(f32),

    // line editing
    BeginEdit,
    EditChar(char),
    EditBackspace,
    CommitEdit,
    CancelEdit,

    // keyboard mode, scale degree 0-11
    KeyDown(u8),
    KeyUp(u8),

    ToggleKeyboardMode,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Grid,
    Edit,
    Keyboard,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackRow {
    pub text: String, // the track's line as the parser would read it back
    pub steps: Vec<bool>,
    pub routed: bool,
    pub failed: bool, // last build for this track failed; it stays silent
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub rows: Vec<TrackRow>,
    pub counter: Option<u64>, // last tick fired, None before the first
    pub bpm: f32,
    pub playing: bool,
    pub mode: Mode,
    pub cursor_row: usize,
    pub cursor_step: usize,
    pub edit_buffer: String,
    pub held_keys: [bool; NUM_KEYS],
    pub status: String,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            counter: None,
            bpm: DEFAULT_BPM,
            playing: false,
            mode: Mode::Grid,
            cursor_row: 0,
            cursor_step: 0,
            edit_buffer: String::new(),
            held_keys: [false; NUM_KEYS],
            status: String::new(),
        }
    }
}
