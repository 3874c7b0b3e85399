//! Event Handling
//!
//! Keyboard handling for the log viewer.

use crate::app::{App, Mode, SelectorKind};
use anyhow::Result;
use crossterm::event::{poll, read, Event, KeyCode, KeyModifiers};
use std::time::Duration;

/// Handle events, returns true if app should quit
pub async fn handle_events(app: &mut App) -> Result<bool> {
    if poll(Duration::from_millis(100))? {
        if let Event::Key(key) = read()? {
            return handle_key_event(app, key.code, key.modifiers).await;
        }
    }
    Ok(false)
}

pub async fn handle_key_event(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Result<bool> {
    // Global quit shortcut
    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        app.cancel_request();
        return Ok(true);
    }

    match app.mode {
        Mode::Normal => handle_normal_mode(app, code, modifiers).await,
        Mode::Search => handle_search_mode(app, code, modifiers).await,
        Mode::Advanced => handle_advanced_mode(app, code, modifiers).await,
        Mode::Detail => Ok(handle_detail_mode(app, code)),
        Mode::Help => {
            app.exit_mode();
            Ok(false)
        },
        Mode::Selector => handle_selector_mode(app, code).await,
    }
}

async fn handle_normal_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Result<bool> {
    app.error_message = None;

    match code {
        // Quit
        KeyCode::Char('q') => {
            app.cancel_request();
            return Ok(true);
        },

        // Stop a running request
        KeyCode::Esc | KeyCode::Char('x') => app.cancel_request(),

        // Navigation - vim style + accessible alternatives
        KeyCode::Char('j') | KeyCode::Down => app.next(),
        KeyCode::Char('k') | KeyCode::Up => app.previous(),
        KeyCode::Home | KeyCode::Char('g') => app.go_to_top(),
        KeyCode::End | KeyCode::Char('G') => app.go_to_bottom(),
        KeyCode::PageDown => app.page_down(app.viewport_height),
        KeyCode::PageUp => app.page_up(app.viewport_height),
        KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => {
            app.page_down(app.viewport_height / 2);
        },
        KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => {
            app.page_up(app.viewport_height / 2);
        },

        // Details
        KeyCode::Enter | KeyCode::Char('d') => app.enter_detail_mode(),

        // Pagination
        KeyCode::Char('n') | KeyCode::Char(']') => app.load_next_page(),

        // Refresh from now
        KeyCode::Char('r') | KeyCode::Char('R') => app.refresh().await,

        // Filters
        KeyCode::Char('/') => {
            app.mode = Mode::Search;
        },
        KeyCode::Char('f') => app.toggle_advanced(),
        KeyCode::Char('s') => app.open_selector(SelectorKind::Severity),
        KeyCode::Char('t') => app.open_selector(SelectorKind::Resource),
        KeyCode::Char('l') => app.open_selector(SelectorKind::LogId),
        KeyCode::Char('o') => app.toggle_order().await,

        // Display
        KeyCode::Char('z') => {
            app.utc = !app.utc;
            app.config.utc = app.utc;
            if let Err(e) = app.config.save() {
                tracing::warn!("Failed to save config: {}", e);
            }
        },

        KeyCode::Char('?') => {
            app.mode = Mode::Help;
        },

        _ => {},
    }

    Ok(false)
}

/// Quick search narrows the loaded entries as you type; Enter also
/// sends the terms to the server with a fresh query.
async fn handle_search_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Result<bool> {
    match code {
        KeyCode::Esc => {
            app.clear_search();
            app.mode = Mode::Normal;
        },
        KeyCode::Enter => {
            app.mode = Mode::Normal;
            app.reload().await;
        },
        KeyCode::Backspace => {
            app.search_text.pop();
            app.apply_search();
        },
        KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
            app.search_text.push(c);
            app.apply_search();
        },
        _ => {},
    }
    Ok(false)
}

async fn handle_advanced_mode(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Result<bool> {
    match code {
        // Leave the text in place, back to browsing
        KeyCode::Esc => app.mode = Mode::Normal,
        KeyCode::Enter => {
            app.mode = Mode::Normal;
            app.reload().await;
        },
        // Back to simple selectors
        KeyCode::Tab => app.toggle_advanced(),
        KeyCode::Backspace => {
            app.advanced_text.pop();
        },
        KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
            app.advanced_text.push(c);
        },
        _ => {},
    }
    Ok(false)
}

fn handle_detail_mode(app: &mut App, code: KeyCode) -> bool {
    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter | KeyCode::Char('d') => {
            app.exit_mode()
        },
        KeyCode::Char('j') | KeyCode::Down => app.next(),
        KeyCode::Char('k') | KeyCode::Up => app.previous(),
        KeyCode::Home | KeyCode::Char('g') => app.detail_scroll = 0,
        _ => {},
    }
    false
}

async fn handle_selector_mode(app: &mut App, code: KeyCode) -> Result<bool> {
    match code {
        KeyCode::Esc | KeyCode::Char('q') => app.exit_mode(),
        KeyCode::Char('j') | KeyCode::Down => app.next(),
        KeyCode::Char('k') | KeyCode::Up => app.previous(),
        KeyCode::Enter => {
            if app.apply_selector() {
                app.reload().await;
            }
        },
        _ => {},
    }
    Ok(false)
}
