//! UI rendering for the TUI.

use chrono::{DateTime, Utc};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::jobs::{JobStatus, PollState, SyncType, TrackedJob};

use super::app::{FormField, StartForm, TuiApp, View};

/// Main render function - dispatches to view-specific renderers.
pub fn render(frame: &mut Frame, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Footer/help
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    match &app.view {
        View::Dashboard { selected } => render_jobs(frame, app, chunks[1], *selected),
        View::StartSync(form) => render_form(frame, app, chunks[1], form),
    }

    render_footer(frame, app, chunks[2]);
}

fn render_header(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let title = format!(
        "syncwatch  {}  tracked: {}  polling: {}",
        app.api_url(),
        app.jobs.len(),
        app.active_count()
    );

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(block, area);
}

fn render_jobs(frame: &mut Frame, app: &TuiApp, area: Rect, selected: usize) {
    let block = Block::default()
        .title(format!("Sync Operations ({})", app.jobs.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.jobs.is_empty() {
        let text = Paragraph::new("  No syncs tracked. Press [n] to start one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = app
        .jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let is_selected = i == selected;
            let style = if is_selected {
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let mut lines = vec![job_summary_line(job, is_selected)];
            lines.push(job_counts_line(job));
            if !job.record.message.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("      {}", job.record.message),
                    Style::default().fg(Color::Gray),
                )));
            }

            ListItem::new(lines).style(style)
        })
        .collect();

    // The list state scrolls the selection into view.
    let mut state = ListState::default().with_selected(Some(selected));
    let list = List::new(items).block(block);
    frame.render_stateful_widget(list, area, &mut state);
}

fn job_summary_line(job: &TrackedJob, is_selected: bool) -> Line<'static> {
    let record = &job.record;

    let status_icon = match record.status {
        JobStatus::Completed => Span::styled("✓", Style::default().fg(Color::Green)),
        JobStatus::Failed => Span::styled("✗", Style::default().fg(Color::Red)),
        JobStatus::Running => Span::styled("•", Style::default().fg(Color::Yellow)),
    };

    let mut spans = vec![
        Span::raw(if is_selected { "> " } else { "  " }),
        status_icon,
        Span::raw(format!("  {}  {:<9}", record.id.short(), record.status)),
    ];

    if record.status == JobStatus::Running {
        let pct = record.progress_percent();
        spans.push(Span::raw(format!("  {} {:>3}%", progress_bar(pct, 25), pct)));
    }

    spans.push(poll_state_span(&job.poll));
    Line::from(spans)
}

fn job_counts_line(job: &TrackedJob) -> Line<'static> {
    let record = &job.record;

    let mut spans = vec![
        Span::raw(format!("      fetched {}", record.discovered)),
        Span::styled(
            format!("  processed {}", record.processed),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!("  failed {}", record.failed),
            Style::default().fg(Color::Red),
        ),
        Span::raw(format!("  started {}", format_started(record.started_at))),
    ];

    if let Some(completed_at) = record.completed_at {
        spans.push(Span::raw(format!(
            "  completed {}",
            format_completed(completed_at)
        )));
    }

    Line::from(spans)
}

fn poll_state_span(state: &PollState) -> Span<'static> {
    match state {
        PollState::Polling | PollState::Finished => Span::raw(""),
        PollState::Retrying { attempt } => Span::styled(
            format!("  retrying ({})", attempt),
            Style::default().fg(Color::Yellow),
        ),
        PollState::Stalled { reason } => Span::styled(
            format!("  STALLED: {}", reason),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        PollState::Cancelled => {
            Span::styled("  not watched", Style::default().fg(Color::DarkGray))
        }
    }
}

fn render_form(frame: &mut Frame, app: &TuiApp, area: Rect, form: &StartForm) {
    let block = Block::default()
        .title("Start Sync")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let sync_type = format!(
        "< {} >  ({})",
        form.sync_type,
        match form.sync_type {
            SyncType::Incremental => "only new/updated pages",
            SyncType::Full => "all pages",
        }
    );

    let mut lines = vec![
        Line::from(""),
        form_line("Sync Type", sync_type, form.field == FormField::SyncType),
        form_line(
            "Spaces",
            form.spaces.clone(),
            form.field == FormField::Spaces,
        ),
        form_line("Tags", form.tags.clone(), form.field == FormField::Tags),
        Line::from(""),
    ];

    if app.starting {
        lines.push(Line::from(Span::styled(
            "  Starting sync...",
            Style::default().fg(Color::Yellow),
        )));
    }

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn form_line(label: &str, value: String, focused: bool) -> Line<'static> {
    let label_style = if focused {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let cursor = if focused { "_" } else { "" };

    Line::from(vec![
        Span::styled(format!("  {:<11}", format!("{}:", label)), label_style),
        Span::raw(format!("{}{}", value, cursor)),
    ])
}

fn render_footer(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let help_text = match &app.view {
        View::Dashboard { .. } => {
            "[↑↓] Navigate  [n] New sync  [c] Stop watching  [d] Discard  [q] Quit"
        }
        View::StartSync(_) => {
            "[Tab] Next field  [←→/Space] Sync type  [Enter] Start  [Esc] Back"
        }
    };

    let mut spans = vec![Span::raw(format!("  {}", help_text))];

    if let Some(error) = &app.error {
        spans.push(Span::styled(
            format!("  Error: {}", error),
            Style::default().fg(Color::Red),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}

fn progress_bar(percentage: u8, width: usize) -> String {
    let percentage = percentage.min(100) as usize;
    let filled = (percentage * width) / 100;
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

fn format_started(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %H:%M").to_string()
}

fn format_completed(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y %H:%M:%S").to_string()
}
