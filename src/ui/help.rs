//! Help Overlay
//!
//! Shows keyboard shortcuts.

use super::centered_rect;
use crate::app::App;
use ratatui::{
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "Navigation",
        &[
            ("j/k, ↑/↓", "Move up/down"),
            ("g/G", "Go to top/bottom"),
            ("PgUp/PgDn", "Page up/down"),
            ("Ctrl+d/u", "Half page down/up"),
            ("Enter/d", "Entry details"),
        ],
    ),
    (
        "Loading",
        &[
            ("n/]", "Load more entries"),
            ("r/R", "Refresh from now"),
            ("o", "Toggle newest/oldest first"),
            ("x/Esc", "Cancel running request"),
        ],
    ),
    (
        "Filtering",
        &[
            ("/", "Search (Enter queries the server)"),
            ("t", "Resource type"),
            ("s", "Minimum severity"),
            ("l", "Log"),
            ("f", "Advanced filter on/off"),
        ],
    ),
    (
        "Display",
        &[
            ("z", "UTC/local time"),
            ("?", "Close help"),
            ("q", "Quit"),
        ],
    ),
];

pub fn render(f: &mut Frame, _app: &App) {
    let popup_area = centered_rect(60, 80, f.area());
    f.render_widget(Clear, popup_area);

    let mut lines = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    for (title, keys) in SECTIONS {
        lines.push(Line::from(Span::styled(
            *title,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for (key, desc) in *keys {
            lines.push(Line::from(vec![
                Span::styled(format!("  {:<12}", key), Style::default().fg(Color::Yellow)),
                Span::raw(*desc),
            ]));
        }
        lines.push(Line::from(""));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            " Help ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Left);

    f.render_widget(paragraph, popup_area);
}
