use crate::shared::{Mode, NUM_KEYS};

// state local to the tui, used to resolve raw keys into semantic input events
// mode is synced from DisplayState each loop
#[derive(Clone, Debug)]
pub struct TuiState {
    pub mode: Mode,
    // keys we've seen go down in keyboard mode; lets us send the matching KeyUp
    // even when the terminal never reports releases
    pub down: [bool; NUM_KEYS],
    pub releases_reported: bool,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            mode: Mode::Grid,
            down: [false; NUM_KEYS],
            releases_reported: false,
        }
    }
}
