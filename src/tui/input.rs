use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};

use super::mode::TuiState;
use crate::middle::nudge_for;
use crate::pipeline::keyboard::key_degree;
use crate::shared::{Direction, InputEvent, Mode};

// poll for input from the terminal and resolve key presses into semantic
// events for the middle layer, depending on the current mode
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }
    if let Event::Key(key) = event::read()? {
        return Ok(handle_key(key, ts));
    }
    Ok(vec![])
}

fn handle_key(key: KeyEvent, ts: &mut TuiState) -> Vec<InputEvent> {
    if ts.mode == Mode::Keyboard {
        return resolve_keyboard(key, ts);
    }
    if key.kind != KeyEventKind::Press {
        return vec![];
    }
    match ts.mode {
        Mode::Edit => resolve_edit(key.code),
        _ => resolve_grid(key.code),
    }
}

fn resolve_grid(code: KeyCode) -> Vec<InputEvent> {
    let event = match code {
        KeyCode::Esc => InputEvent::Quit,
        KeyCode::Up => InputEvent::MoveCursor(Direction::Up),
        KeyCode::Down => InputEvent::MoveCursor(Direction::Down),
        KeyCode::Left => InputEvent::MoveCursor(Direction::Left),
        KeyCode::Right => InputEvent::MoveCursor(Direction::Right),
        KeyCode::Char(' ') => InputEvent::ToggleStep,
        KeyCode::Enter => InputEvent::BeginEdit,
        KeyCode::Char('k') => InputEvent::ToggleRoute,
        KeyCode::Char('n') => InputEvent::AddTrack,
        KeyCode::Char('x') => InputEvent::RemoveTrack,
        KeyCode::Char('p') => InputEvent::PlayPress,
        KeyCode::Char('+') | KeyCode::Char('=') => InputEvent::NudgeBpm(nudge_for(true)),
        KeyCode::Char('-') => InputEvent::NudgeBpm(nudge_for(false)),
        KeyCode::Tab => InputEvent::ToggleKeyboardMode,
        _ => return vec![],
    };
    vec![event]
}

fn resolve_edit(code: KeyCode) -> Vec<InputEvent> {
    match code {
        KeyCode::Enter => vec![InputEvent::CommitEdit],
        KeyCode::Esc => vec![InputEvent::CancelEdit],
        KeyCode::Backspace => vec![InputEvent::EditBackspace],
        KeyCode::Char(c) => vec![InputEvent::EditChar(c)],
        _ => vec![],
    }
}

// key down attacks, key up releases. terminals without release reporting get
// the release right before the next press of the same key
fn resolve_keyboard(key: KeyEvent, ts: &mut TuiState) -> Vec<InputEvent> {
    match (key.code, key.kind) {
        (KeyCode::Tab, KeyEventKind::Press) => {
            let mut events = release_all(ts);
            events.push(InputEvent::ToggleKeyboardMode);
            events
        }
        (KeyCode::Esc, KeyEventKind::Press) => {
            let mut events = release_all(ts);
            events.push(InputEvent::Quit);
            events
        }
        (KeyCode::Char(c), kind) => {
            let Some(degree) = key_degree(c) else {
                return vec![];
            };
            let i = degree as usize;
            match kind {
                KeyEventKind::Press => {
                    let mut events = Vec::new();
                    if ts.down[i] && !ts.releases_reported {
                        events.push(InputEvent::KeyUp(degree));
                    }
                    ts.down[i] = true;
                    events.push(InputEvent::KeyDown(degree));
                    events
                }
                KeyEventKind::Release => {
                    ts.releases_reported = true;
                    ts.down[i] = false;
                    vec![InputEvent::KeyUp(degree)]
                }
                KeyEventKind::Repeat => vec![],
            }
        }
        _ => vec![],
    }
}

fn release_all(ts: &mut TuiState) -> Vec<InputEvent> {
    let mut events = Vec::new();
    for (i, down) in ts.down.iter_mut().enumerate() {
        if *down {
            *down = false;
            events.push(InputEvent::KeyUp(i as u8));
        }
    }
    events
}
