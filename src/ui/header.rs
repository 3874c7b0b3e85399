//! Header Component
//!
//! Displays the project and the current filter selections.

use crate::app::{App, ALL_LABEL};
use crate::logging::SortOrder;
use crate::VERSION;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" tglogs v{} ", VERSION),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    // Row 1: Project and time zone
    let project_line = Line::from(vec![
        Span::styled(" Project: ", label),
        Span::styled(&app.project, value),
        Span::raw("  "),
        Span::styled("Times: ", label),
        Span::styled(if app.utc { "UTC" } else { "Local" }, value),
    ]);
    f.render_widget(Paragraph::new(project_line), rows[0]);

    // Row 2: Selections
    let selections = if app.show_advanced {
        Line::from(vec![
            Span::styled(" Filter: ", label),
            Span::styled("advanced", Style::default().fg(Color::Magenta)),
        ])
    } else {
        let severity = app
            .severity
            .map(|s| format!(">= {}", s))
            .unwrap_or_else(|| ALL_LABEL.to_string());
        Line::from(vec![
            Span::styled(" Resource: ", label),
            Span::styled(app.resource_type.as_deref().unwrap_or(ALL_LABEL), value),
            Span::raw("  "),
            Span::styled("Severity: ", label),
            Span::styled(severity, value),
            Span::raw("  "),
            Span::styled("Log: ", label),
            Span::styled(app.log_id.as_deref().unwrap_or(ALL_LABEL), value),
        ])
    };
    f.render_widget(Paragraph::new(selections), rows[1]);

    // Row 3: Time bound
    let (direction, word) = match app.time_bound.order {
        SortOrder::Descending => ("newest first", "before"),
        SortOrder::Ascending => ("oldest first", "after"),
    };
    let at = if app.utc {
        app.time_bound.at.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        app.time_bound
            .at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    };
    let time_line = Line::from(vec![
        Span::styled(format!(" Entries {} ", word), label),
        Span::styled(at, Style::default().fg(Color::Green)),
        Span::styled(format!("  ({})", direction), label),
        Span::styled("   ?:help  q:quit", label),
    ]);
    f.render_widget(Paragraph::new(time_line), rows[2]);
}
