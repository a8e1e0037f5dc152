//! UI rendering for the TUI.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::core::{Badge, ColorClass, ConnectionState, Job, StreamEvent, TextContrast, badge_for};

use super::app::WatchApp;

/// Main render function.
pub fn render(frame: &mut Frame, app: &WatchApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(7), // Job details
            Constraint::Min(0),    // Timeline
            Constraint::Length(3), // Footer/help
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_job(frame, app.view.job.as_ref(), chunks[1]);
    render_timeline(frame, app, chunks[2]);
    render_footer(frame, app, chunks[3]);
}

fn badge_style(badge: &Badge<'_>) -> Style {
    let bg = match badge.color {
        ColorClass::Warning => Color::Yellow,
        ColorClass::Primary => Color::Blue,
        ColorClass::Success => Color::Green,
        ColorClass::Danger => Color::Red,
        ColorClass::Secondary => Color::DarkGray,
    };
    let fg = match badge.contrast {
        TextContrast::Light => Color::White,
        TextContrast::Dark => Color::Black,
    };
    Style::default().bg(bg).fg(fg).add_modifier(Modifier::BOLD)
}

fn badge_span(badge: Badge<'_>) -> Span<'static> {
    Span::styled(format!(" {} ", badge.label), badge_style(&badge))
}

fn render_header(frame: &mut Frame, app: &WatchApp, area: Rect) {
    let (indicator, color) = match app.view.connection {
        ConnectionState::Open => ("● live", Color::Green),
        ConnectionState::Connecting => ("○ connecting", Color::Yellow),
        ConnectionState::Errored => ("✗ disconnected", Color::Red),
        ConnectionState::Closed => ("✗ closed", Color::DarkGray),
    };

    let mut spans = vec![Span::raw(format!(" Job {}  ", app.view.job_id))];
    match &app.view.job {
        Some(job) => spans.push(badge_span(badge_for(&job.status))),
        None => spans.push(Span::styled(
            "(waiting for snapshot)",
            Style::default().fg(Color::DarkGray),
        )),
    }
    spans.push(Span::raw("  "));
    spans.push(Span::styled(indicator, Style::default().fg(color)));

    let block = Block::default()
        .title("tracewatch")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_job(frame: &mut Frame, job: Option<&Job>, area: Rect) {
    let block = Block::default()
        .title("Job Details")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let Some(job) = job else {
        let text = Paragraph::new("  Loading...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(text, area);
        return;
    };

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Cyan));
    let duration = job
        .duration
        .map(|secs| format!("{secs}s"))
        .unwrap_or_else(|| "-".to_string());

    let lines = vec![
        Line::from(vec![
            label("  Devices:  "),
            Span::raw(job.device_serials.join(", ")),
        ]),
        Line::from(vec![label("  Duration: "), Span::raw(duration)]),
        Line::from(vec![
            label("  Created:  "),
            Span::raw(job.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ]),
        Line::from(vec![
            label("  Config:   "),
            Span::raw(job.config_id.as_deref().unwrap_or("-")),
        ]),
        Line::from(vec![
            label("  Summary:  "),
            Span::raw(job.result_summary.as_deref().unwrap_or("-")),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn timeline_line(event: &StreamEvent) -> Line<'static> {
    let mut spans = vec![
        Span::raw(format!("  {}  ", event.timestamp.format("%H:%M:%S"))),
        Span::styled(
            format!("{:<16}", event.device_serial),
            Style::default().fg(Color::White),
        ),
        badge_span(badge_for(&event.status)),
    ];

    if !event.message.is_empty() {
        spans.push(Span::raw(format!("  {}", event.message)));
    }
    let trace = event.trace_url.as_ref().or(event.trace_id.as_ref());
    if let Some(trace) = trace {
        spans.push(Span::styled(
            format!("  trace {trace}"),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::UNDERLINED),
        ));
    }

    Line::from(spans)
}

fn render_timeline(frame: &mut Frame, app: &WatchApp, area: Rect) {
    let block = Block::default()
        .title(format!("Activity ({})", app.view.timeline.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.view.timeline.is_empty() {
        let text = Paragraph::new("  No device updates yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = app
        .view
        .timeline
        .iter()
        .map(|event| ListItem::new(timeline_line(event)))
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer(frame: &mut Frame, app: &WatchApp, area: Rect) {
    let mut spans = vec![Span::raw("  [↑↓] Scroll  [g] Newest  [r] Reconnect  [q] Quit")];

    if let Some(notice) = &app.notice {
        spans.push(Span::styled(
            format!("  {notice}"),
            Style::default().fg(Color::Yellow),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}
