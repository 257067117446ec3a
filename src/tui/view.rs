use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use super::grid::draw_track_grid;
use crate::shared::{DisplayState, KEYBOARD_KEYS, Mode};

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // transport line
            Constraint::Min(4),    // tracks
            Constraint::Length(3), // keyboard / help
        ])
        .split(area);

    draw_header(frame, sections[0], state);
    let tracks = Block::default().borders(Borders::ALL).title(" tracks ");
    let inner = tracks.inner(sections[1]);
    frame.render_widget(tracks, sections[1]);
    draw_track_grid(frame, inner, state);
    draw_footer(frame, sections[2], state);
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let play = if state.playing { "▶ playing" } else { "⏸ paused" };
    let counter = state.counter.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
    let mut spans = vec![
        Span::styled(format!(" {:>5.1} bpm ", state.bpm), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {}  step {} ", play, counter)),
    ];
    if !state.status.is_empty() {
        spans.push(Span::styled(format!(" {}", state.status), Style::default().fg(Color::Yellow)));
    }
    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(" rowsynth "));
    frame.render_widget(header, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let line = match state.mode {
        Mode::Keyboard => {
            let keys = KEYBOARD_KEYS
                .iter()
                .zip(state.held_keys.iter())
                .map(|(k, held)| {
                    let style = if *held {
                        Style::default().fg(Color::Black).bg(Color::LightMagenta)
                    } else {
                        Style::default()
                    };
                    Span::styled(format!(" {} ", k), style)
                })
                .collect::<Vec<_>>();
            Line::from(keys)
        }
        Mode::Edit => Line::from(" enter: keep   esc: revert   e.g. C4/8n @fm s12 75% | @reverb"),
        Mode::Grid => Line::from(
            " arrows: move  space: step  enter: edit  k: route  n/x: add/remove  p: play  +/-: bpm  tab: play keys  esc: quit",
        ),
    };
    let title = match state.mode {
        Mode::Keyboard => " keyboard (tab: back) ",
        Mode::Edit => " editing ",
        Mode::Grid => " keys ",
    };
    frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(title)), area);
}
