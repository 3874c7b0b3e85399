//! Terminal User Interface rendering module
//!
//! Renders the log viewer using ratatui.
//!
//! # Architecture
//!
//! - `header` - Project and current filter selections
//! - `help` - Help overlay showing keybindings
//! - `detail` - Tree view of the selected entry
//! - `selector` - Popup picker for resource type, severity and log id
//! - [`splash`] - Startup progress screen
//!
//! # Virtual Scrolling
//!
//! Only visible rows are rendered, with a scrollbar indicating position.
//! Entries are grouped by calendar date: the date is printed on the first
//! row of each group.

mod detail;
mod header;
mod help;
mod selector;
pub mod splash;

use crate::app::{App, Mode};
use crate::logging::{LogEntry, LogSeverity};
use chrono::{Local, NaiveDate, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState,
    },
    Frame,
};
use std::sync::Arc;

pub fn render(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Header
            Constraint::Length(1), // Filter bar
            Constraint::Min(1),    // Entries or detail
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    header::render(f, app, chunks[0]);
    render_filter_bar(f, app, chunks[1]);

    match app.mode {
        Mode::Detail => detail::render(f, app, chunks[2]),
        _ => render_entries(f, app, chunks[2]),
    }

    render_status(f, app, chunks[3]);

    // Overlays
    match app.mode {
        Mode::Help => help::render(f, app),
        Mode::Selector => selector::render(f, app),
        _ => {},
    }
}

fn render_filter_bar(f: &mut Frame, app: &App, area: Rect) {
    let active = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let idle = Style::default().fg(Color::DarkGray);

    let line = if app.show_advanced {
        let editing = app.mode == Mode::Advanced;
        Line::from(vec![
            Span::styled(" filter> ", idle),
            Span::styled(
                if editing {
                    format!("{}_", app.advanced_text)
                } else {
                    app.advanced_text.clone()
                },
                if editing { active } else { idle },
            ),
        ])
    } else {
        let editing = app.mode == Mode::Search;
        if !editing && app.search_text.is_empty() {
            Line::from(Span::styled(" /search  f:advanced filter", idle))
        } else {
            Line::from(Span::styled(
                if editing {
                    format!(" /{}_", app.search_text)
                } else {
                    format!(" /{}", app.search_text)
                },
                if editing { active } else { idle },
            ))
        }
    };

    f.render_widget(Paragraph::new(line), area);
}

/// Entry table with virtual scrolling
fn render_entries(f: &mut Frame, app: &mut App, area: Rect) {
    let state = app.retrieval_state();

    let title = {
        let count = app.visible.len();
        let more = if state.has_more { "+" } else { "" };
        if app.search_text.is_empty() {
            format!(" Logs[{}{}] ", count, more)
        } else {
            format!(" Logs[{}/{}{}] ", count, app.total_count, more)
        }
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if state.is_loading {
            Color::Yellow
        } else {
            Color::DarkGray
        }))
        .title(Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
        .title_alignment(Alignment::Center);

    let inner_area = block.inner(area);
    f.render_widget(block, area);

    if app.visible.is_empty() {
        let msg = if state.is_loading {
            "Loading..."
        } else {
            "No log entries. Press r to refresh or t/s/l to change the filter."
        };
        f.render_widget(
            Paragraph::new(msg).style(Style::default().fg(Color::DarkGray)),
            inner_area,
        );
        return;
    }

    // Account for header row
    let visible_height = (inner_area.height as usize).saturating_sub(1);
    app.update_viewport(visible_height);
    app.ensure_visible();

    let total_items = app.visible.len();
    let needs_scrollbar = total_items > visible_height;
    let table_area = if needs_scrollbar {
        Rect {
            width: inner_area.width.saturating_sub(1),
            ..inner_area
        }
    } else {
        inner_area
    };

    let range = app.visible_range();
    let dates = row_dates(&app.visible, range.start, range.end, app.utc);

    let header_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let header = Row::new(
        ["Date", "Time", "Severity", "Log", "Message"]
            .into_iter()
            .map(|h| Cell::from(format!(" {}", h)).style(header_style)),
    )
    .height(1);

    let rows: Vec<Row> = app.visible[range.clone()]
        .iter()
        .zip(dates)
        .map(|(entry, date)| {
            let date_cell = date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
            let time = if app.utc {
                entry.time_in(&Utc)
            } else {
                entry.time_in(&Local)
            };
            let severity = entry.severity;

            Row::new(vec![
                Cell::from(format!(" {}", date_cell)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format!(" {}", time)),
                Cell::from(format!(" {}", severity)).style(severity_style(severity)),
                Cell::from(format!(" {}", truncate_string(&entry.log_id(), 24)))
                    .style(Style::default().fg(Color::DarkGray)),
                Cell::from(format!(" {}", first_line(&entry.message()))),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Length(14),
        Constraint::Length(11),
        Constraint::Length(26),
        Constraint::Min(20),
    ];

    let table = Table::new(rows, widths).header(header).row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let mut table_state = TableState::default();
    if app.selected >= range.start && app.selected < range.end {
        table_state.select(Some(app.selected - range.start));
    }

    f.render_stateful_widget(table, table_area, &mut table_state);

    if needs_scrollbar {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .symbols(symbols::scrollbar::VERTICAL)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));

        let mut scrollbar_state = ScrollbarState::new(total_items.saturating_sub(visible_height))
            .position(app.scroll_offset);

        f.render_stateful_widget(scrollbar, inner_area, &mut scrollbar_state);
    }
}

/// Date label per row in `start..end`: the date on the first row of each
/// date group, `None` on the rest.
fn row_dates(
    entries: &[Arc<LogEntry>],
    start: usize,
    end: usize,
    utc: bool,
) -> Vec<Option<NaiveDate>> {
    let date_of = |e: &LogEntry| {
        if utc {
            e.date_in(&Utc)
        } else {
            e.date_in(&Local)
        }
    };

    let mut previous = start
        .checked_sub(1)
        .and_then(|i| entries.get(i))
        .map(|e| date_of(e.as_ref()));

    entries[start..end]
        .iter()
        .map(|e| {
            let date = date_of(e.as_ref());
            let label = if previous == Some(date) { None } else { date };
            previous = Some(date);
            label
        })
        .collect()
}

fn severity_style(severity: LogSeverity) -> Style {
    match severity {
        LogSeverity::Emergency | LogSeverity::Alert | LogSeverity::Critical => {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        },
        LogSeverity::Error => Style::default().fg(Color::Red),
        LogSeverity::Warning => Style::default().fg(Color::Yellow),
        LogSeverity::Notice | LogSeverity::Info => Style::default().fg(Color::Green),
        LogSeverity::Debug | LogSeverity::Default => Style::default().fg(Color::DarkGray),
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

/// Truncate string for display (Unicode-safe)
fn truncate_string(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_len {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let state = app.retrieval_state();

    let (text, style) = if let Some(err) = &app.error_message {
        (
            format!("Error: {}", err),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if state.is_loading {
        let text = if state.cancellation_requested {
            "Cancelling...".to_string()
        } else {
            format!(
                "Loading... {} entries (x/Esc: cancel)",
                state.accumulated_count
            )
        };
        (text, Style::default().fg(Color::Yellow))
    } else if let Some(status) = &app.status_message {
        (status.clone(), Style::default().fg(Color::Cyan))
    } else {
        let hint = match app.mode {
            Mode::Detail => "j/k: scroll | q/d/Esc: back",
            Mode::Search => "Type to search loaded entries | Enter: query server | Esc: clear",
            Mode::Advanced => "Enter: run filter | Tab: simple selectors | Esc: done",
            Mode::Selector => "j/k: move | Enter: select | Esc: cancel",
            _ if state.has_more => "n/]: more entries | r: refresh | ?: help",
            _ => "r: refresh | ?: help",
        };
        (hint.to_string(), Style::default().fg(Color::DarkGray))
    };

    let line = Line::from(vec![
        Span::styled(
            format!("<{}>", app.project),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::styled(text, style),
    ]);

    f.render_widget(Paragraph::new(line), area);
}

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
