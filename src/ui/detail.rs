//! Entry detail view
//!
//! Renders the tree of the selected entry, one node per line.

use crate::app::App;
use crate::logging::tree::TreeNode;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};

pub fn render(f: &mut Frame, app: &mut App, area: Rect) {
    let lines: Vec<Line> = match app.selected_tree() {
        Some(tree) => tree_lines(&tree),
        None => vec![Line::from("No entry selected")],
    };
    let total_lines = lines.len();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            " Entry Details ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let visible_lines = inner_area.height as usize;
    let max_scroll = total_lines.saturating_sub(visible_lines);
    app.detail_scroll = app.detail_scroll.min(max_scroll);
    let scroll = app.detail_scroll;

    f.render_widget(
        Paragraph::new(lines).scroll((scroll as u16, 0)),
        inner_area,
    );

    if total_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));
        let mut scrollbar_state = ScrollbarState::new(max_scroll + visible_lines).position(scroll);
        f.render_stateful_widget(scrollbar, inner_area, &mut scrollbar_state);
    }
}

/// The root node is skipped; its children start at the left margin.
fn tree_lines(tree: &TreeNode) -> Vec<Line<'static>> {
    tree.flatten()
        .into_iter()
        .skip(1)
        .map(|(depth, node)| {
            let indent = "  ".repeat(depth.saturating_sub(1));
            let marker = if node.is_leaf() { "  " } else { "▾ " };
            let name_style = if node.is_leaf() {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            };

            let mut spans = vec![
                Span::raw(format!("{}{}", indent, marker)),
                Span::styled(node.name.clone(), name_style),
            ];
            if let Some(value) = node.value.as_deref().filter(|v| !v.trim().is_empty()) {
                spans.push(Span::styled(" : ", Style::default().fg(Color::DarkGray)));
                spans.push(Span::styled(
                    value.to_string(),
                    Style::default().fg(Color::Green),
                ));
            }
            Line::from(spans)
        })
        .collect()
}
