use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::shared::{DisplayState, Mode, TrackRow};

const TEXT_WIDTH: u16 = 36;

// one line per track: its notation on the left, step cells on the right.
// the playing column is counter mod that track's own step count
pub fn draw_track_grid(frame: &mut Frame, area: Rect, state: &DisplayState) {
    if state.rows.is_empty() {
        frame.render_widget(Paragraph::new("no tracks, press n to add one"), area);
        return;
    }
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(1); state.rows.len()])
        .split(area);

    for (i, (row, row_area)) in state.rows.iter().zip(rows.iter()).enumerate() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(TEXT_WIDTH), Constraint::Min(1)])
            .split(*row_area);
        let selected = i == state.cursor_row;

        frame.render_widget(Paragraph::new(track_label(row, selected, state)), cols[0]);
        frame.render_widget(Paragraph::new(step_cells(row, selected, state)), cols[1]);
    }
}

fn track_label(row: &TrackRow, selected: bool, state: &DisplayState) -> Line<'static> {
    let marker = if selected { ">" } else { " " };
    let route = if row.routed { "k" } else { " " };
    let editing = selected && state.mode == Mode::Edit;
    let text = if editing {
        format!("{}_", state.edit_buffer)
    } else {
        row.text.clone()
    };
    let style = if row.failed {
        Style::default().fg(Color::Red)
    } else if editing {
        Style::default().fg(Color::Yellow)
    } else if selected {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::raw(format!("{}{} ", marker, route)),
        Span::styled(text, style),
    ])
}

fn step_cells(row: &TrackRow, selected: bool, state: &DisplayState) -> Line<'static> {
    let playing = state
        .counter
        .filter(|_| !row.steps.is_empty())
        .map(|t| (t % row.steps.len() as u64) as usize);

    let spans = row
        .steps
        .iter()
        .enumerate()
        .map(|(step, on)| {
            let mut style = match (on, playing == Some(step)) {
                (true, true) => Style::default().fg(Color::Black).bg(Color::LightMagenta),
                (true, false) => Style::default().fg(Color::Magenta),
                (false, true) => Style::default().fg(Color::White).bg(Color::DarkGray),
                (false, false) => Style::default().fg(Color::DarkGray),
            };
            if selected && step == state.cursor_step && state.mode == Mode::Grid {
                style = style.add_modifier(Modifier::REVERSED);
            }
            let cell = if *on { "■ " } else { "· " };
            Span::styled(cell, style)
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}
