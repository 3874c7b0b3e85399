//! Application State
//!
//! State of the interactive log viewer: current selections, the visible
//! entry list mirrored from the result sink, and the in-flight retrieval.

use crate::config::Config;
use crate::logging::catalog::{log_name_for, order_resource_descriptors, MonitoredResourceDescriptor};
use crate::logging::tree::{entry_tree, TreeNode};
use crate::logging::{
    compose_advanced_filter, compose_simple_filter, FilterSelection, LogEntry, LogRetriever,
    LogSeverity, LoggingDataSource, RetrievalOutcome, RetrievalState, SharedSink, SinkEvent,
    SortOrder, TimeBound,
};
use crate::gcp::DataSourceError;
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

/// Default viewport height (will be updated during render based on terminal size)
const DEFAULT_VIEWPORT_HEIGHT: usize = 20;

/// Application modes
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Normal,   // Viewing list
    Search,   // / quick search input
    Advanced, // f advanced filter input
    Detail,   // Tree view of the selected entry
    Help,     // ? help popup
    Selector, // Resource / severity / log id picker
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Resource,
    Severity,
    LogId,
}

/// Popup list used by the resource, severity and log id pickers
#[derive(Debug, Clone)]
pub struct Selector {
    pub kind: SelectorKind,
    pub title: String,
    pub items: Vec<String>,
    pub selected: usize,
}

pub const ALL_LABEL: &str = "All";

pub struct App {
    pub project: String,
    pub config: Config,

    // Retrieval
    pub retriever: Arc<LogRetriever<LoggingDataSource>>,
    pub sink: SharedSink,
    events: broadcast::Receiver<SinkEvent>,
    task: Option<JoinHandle<Result<RetrievalOutcome, DataSourceError>>>,

    // Visible entries (quick search applied)
    pub visible: Vec<Arc<LogEntry>>,
    pub total_count: usize,

    // Navigation state
    pub selected: usize,
    pub mode: Mode,
    pub viewport_height: usize,
    pub scroll_offset: usize,
    pub detail_scroll: usize,

    // Filter selections
    pub resources: Vec<MonitoredResourceDescriptor>,
    pub resource_type: Option<String>,
    pub log_ids: Option<Vec<String>>,
    pub log_id: Option<String>,
    pub severity: Option<LogSeverity>,
    pub time_bound: TimeBound,
    pub search_text: String,
    pub advanced_text: String,
    pub show_advanced: bool,
    pub selector: Option<Selector>,

    // Display
    pub utc: bool,
    pub error_message: Option<String>,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(source: LoggingDataSource, config: Config) -> Self {
        let sink = SharedSink::new();
        let events = sink.subscribe();
        let project = source.project_id().to_string();
        let retriever = Arc::new(LogRetriever::new(source, sink.clone()));

        Self {
            project,
            retriever,
            sink,
            events,
            task: None,
            visible: Vec::new(),
            total_count: 0,
            selected: 0,
            mode: Mode::Normal,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            scroll_offset: 0,
            detail_scroll: 0,
            resources: Vec::new(),
            resource_type: config.resource_type.clone(),
            log_ids: None,
            log_id: None,
            severity: config.severity,
            time_bound: TimeBound::before(Utc::now()),
            search_text: String::new(),
            advanced_text: String::new(),
            show_advanced: false,
            selector: None,
            utc: config.utc,
            error_message: None,
            status_message: None,
            config,
        }
    }

    pub fn retrieval_state(&self) -> RetrievalState {
        self.retriever.state()
    }

    pub fn is_loading(&self) -> bool {
        self.retriever.is_loading()
    }

    // =========================================================================
    // Catalogue
    // =========================================================================

    /// Load resource types and log ids if missing. Returns false on failure;
    /// the refresh key retries.
    pub async fn ensure_catalog(&mut self) -> bool {
        if self.resources.is_empty() {
            self.status_message = Some("Loading resource types...".to_string());
            match self.retriever.source().list_resource_descriptors().await {
                Ok(descriptors) => {
                    self.resources = order_resource_descriptors(descriptors);
                    let known = self
                        .resource_type
                        .as_ref()
                        .is_some_and(|t| self.resources.iter().any(|d| &d.resource_type == t));
                    if !known {
                        self.resource_type =
                            self.resources.first().map(|d| d.resource_type.clone());
                    }
                },
                Err(e) => {
                    self.error_message = Some(e.user_message());
                    self.status_message = None;
                    return false;
                },
            }
        }

        if self.log_ids.is_none() {
            self.status_message = Some("Loading log ids...".to_string());
            match self.retriever.source().list_log_ids().await {
                Ok(ids) => self.log_ids = Some(ids),
                Err(e) => {
                    self.error_message = Some(e.user_message());
                    self.status_message = None;
                    return false;
                },
            }
        }

        self.status_message = None;
        true
    }

    // =========================================================================
    // Filters & Loading
    // =========================================================================

    pub fn selection(&self) -> FilterSelection {
        let search = self.search_text.trim();
        FilterSelection {
            resource_type: self.resource_type.clone(),
            severity: self.severity,
            time_bound: Some(self.time_bound),
            log_name: self
                .log_id
                .as_deref()
                .map(|id| log_name_for(&self.project, id)),
            search_text: (!search.is_empty()).then(|| search.to_string()),
        }
    }

    /// Filter sent to the server for the current selections
    pub fn current_filter(&self, now: DateTime<Utc>) -> Option<String> {
        if self.show_advanced {
            compose_advanced_filter(&self.advanced_text, Some(self.time_bound), now)
        } else {
            compose_simple_filter(&self.selection(), now)
        }
    }

    /// Start a new query with the current selections
    pub async fn reload(&mut self) {
        if self.is_loading() {
            tracing::debug!("Reload requested while loading, ignored");
            return;
        }
        if !self.ensure_catalog().await {
            return;
        }

        let filter = self.current_filter(Utc::now());
        let order = self.time_bound.order;
        let retriever = self.retriever.clone();

        // Results are replaced, so start from the top
        self.error_message = None;
        self.selected = 0;
        self.scroll_offset = 0;
        self.task = Some(tokio::spawn(async move { retriever.reload(filter, order).await }));
    }

    /// Fetch the next batch after the current results
    pub fn load_next_page(&mut self) {
        if self.is_loading() || !self.retrieval_state().has_more {
            return;
        }
        let retriever = self.retriever.clone();
        self.error_message = None;
        self.task = Some(tokio::spawn(async move { retriever.load_next_page().await }));
    }

    /// Jump back to "now", newest first
    pub async fn refresh(&mut self) {
        self.time_bound = TimeBound::before(Utc::now());
        self.reload().await;
    }

    pub fn cancel_request(&mut self) {
        if self.retriever.cancel() {
            self.status_message = Some("Cancelling...".to_string());
        }
    }

    pub async fn toggle_order(&mut self) {
        let order = match self.time_bound.order {
            SortOrder::Descending => SortOrder::Ascending,
            SortOrder::Ascending => SortOrder::Descending,
        };
        self.time_bound = TimeBound {
            at: self.time_bound.at,
            order,
        };
        self.reload().await;
    }

    /// Switch between simple selectors and the advanced filter text.
    /// Entering advanced mode seeds it with the composed simple filter.
    pub fn toggle_advanced(&mut self) {
        self.show_advanced = !self.show_advanced;
        if self.show_advanced {
            self.advanced_text = compose_simple_filter(&self.selection(), Utc::now())
                .map(|f| f.trim_end().replace('\n', " "))
                .unwrap_or_default();
            self.mode = Mode::Advanced;
        } else {
            self.advanced_text.clear();
            self.mode = Mode::Normal;
        }
    }

    /// Apply the quick search to the sink; the list refreshes on the event.
    /// The held next-page token belongs to the old search and is dropped.
    pub fn apply_search(&mut self) {
        let text = self.search_text.clone();
        self.sink.lock().set_search_text(Some(text.as_str()));
        self.retriever.discard_next_page();
    }

    pub fn clear_search(&mut self) {
        self.search_text.clear();
        self.sink.lock().set_search_text(None);
        self.retriever.discard_next_page();
    }

    // =========================================================================
    // Background updates
    // =========================================================================

    /// Drain sink events and collect a finished retrieval. Called every frame.
    pub async fn tick(&mut self) {
        // Any event (or a lag) means the sink changed; one refresh covers all
        let mut dirty = false;
        loop {
            match self.events.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => dirty = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if dirty {
            self.refresh_visible();
        }

        // Only await a task that is already done so the frame never blocks
        if self.task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.task.take() {
                match task.await {
                    Ok(Ok(RetrievalOutcome::Cancelled { fetched })) => {
                        self.status_message = Some(format!("Cancelled after {} entries", fetched));
                    },
                    Ok(Ok(_)) => self.status_message = None,
                    Ok(Err(e)) => {
                        self.status_message = None;
                        self.error_message = Some(e.user_message());
                    },
                    Err(e) => {
                        tracing::error!("Retrieval task failed: {}", e);
                        self.error_message = Some("Log retrieval stopped unexpectedly.".to_string());
                    },
                }
            }
        }
    }

    fn refresh_visible(&mut self) {
        let sink = self.sink.lock();
        self.visible = sink.visible();
        self.total_count = sink.len();
        drop(sink);

        // Keep the selection inside a shrunken list
        if self.selected >= self.visible.len() {
            self.selected = self.visible.len().saturating_sub(1);
        }
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    pub fn open_selector(&mut self, kind: SelectorKind) {
        let (title, items, selected) = match kind {
            SelectorKind::Resource => {
                let items: Vec<String> =
                    self.resources.iter().map(|d| d.resource_type.clone()).collect();
                let selected = self
                    .resource_type
                    .as_ref()
                    .and_then(|t| items.iter().position(|i| i == t))
                    .unwrap_or(0);
                ("Resource type", items, selected)
            },
            SelectorKind::Severity => {
                let mut items: Vec<String> =
                    LogSeverity::selectable().iter().map(|s| s.to_string()).collect();
                // "All" sits last, below the lowest level
                items.push(ALL_LABEL.to_string());
                let selected = self
                    .severity
                    .and_then(|s| LogSeverity::selectable().iter().position(|x| *x == s))
                    .unwrap_or(items.len() - 1);
                ("Minimum severity", items, selected)
            },
            SelectorKind::LogId => {
                let mut items = vec![ALL_LABEL.to_string()];
                items.extend(self.log_ids.clone().unwrap_or_default());
                let selected = self
                    .log_id
                    .as_ref()
                    .and_then(|id| items.iter().position(|i| i == id))
                    .unwrap_or(0);
                ("Log", items, selected)
            },
        };

        if items.is_empty() {
            self.error_message = Some("Nothing to choose from yet. Press r to retry.".to_string());
            return;
        }

        self.selector = Some(Selector {
            kind,
            title: title.to_string(),
            items,
            selected,
        });
        self.mode = Mode::Selector;
    }

    /// Apply the highlighted selector item. Returns true when the selection
    /// changed and a reload is due.
    pub fn apply_selector(&mut self) -> bool {
        self.mode = Mode::Normal;
        let Some(selector) = self.selector.take() else {
            return false;
        };
        let Some(choice) = selector.items.get(selector.selected).cloned() else {
            return false;
        };

        match selector.kind {
            // A resource type is always required; there is no "All"
            SelectorKind::Resource => {
                let changed = self.resource_type.as_deref() != Some(choice.as_str());
                self.resource_type = Some(choice);
                changed
            },
            SelectorKind::Severity => {
                let new = LogSeverity::selectable().get(selector.selected).copied();
                let changed = self.severity != new;
                self.severity = new;
                changed
            },
            SelectorKind::LogId => {
                let new = (choice != ALL_LABEL).then_some(choice);
                let changed = self.log_id != new;
                self.log_id = new;
                changed
            },
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn selected_entry(&self) -> Option<&Arc<LogEntry>> {
        self.visible.get(self.selected)
    }

    pub fn selected_tree(&self) -> Option<TreeNode> {
        self.selected_entry().map(|e| entry_tree(e))
    }

    pub fn next(&mut self) {
        match self.mode {
            Mode::Selector => {
                if let Some(s) = self.selector.as_mut() {
                    s.selected = (s.selected + 1).min(s.items.len().saturating_sub(1));
                }
            },
            Mode::Detail => self.detail_scroll += 1,
            _ => {
                if !self.visible.is_empty() {
                    self.selected = (self.selected + 1).min(self.visible.len() - 1);
                }
            },
        }
    }

    pub fn previous(&mut self) {
        match self.mode {
            Mode::Selector => {
                if let Some(s) = self.selector.as_mut() {
                    s.selected = s.selected.saturating_sub(1);
                }
            },
            Mode::Detail => self.detail_scroll = self.detail_scroll.saturating_sub(1),
            _ => self.selected = self.selected.saturating_sub(1),
        }
    }

    pub fn go_to_top(&mut self) {
        self.selected = 0;
    }

    pub fn go_to_bottom(&mut self) {
        self.selected = self.visible.len().saturating_sub(1);
    }

    pub fn page_down(&mut self, page_size: usize) {
        if !self.visible.is_empty() {
            self.selected = (self.selected + page_size).min(self.visible.len() - 1);
        }
    }

    pub fn page_up(&mut self, page_size: usize) {
        self.selected = self.selected.saturating_sub(page_size);
    }

    pub fn enter_detail_mode(&mut self) {
        if self.selected_entry().is_some() {
            self.detail_scroll = 0;
            self.mode = Mode::Detail;
        }
    }

    pub fn exit_mode(&mut self) {
        self.selector = None;
        self.mode = Mode::Normal;
    }

    // =========================================================================
    // Virtual Scrolling
    // =========================================================================

    /// Update the viewport height (called from UI during render)
    pub fn update_viewport(&mut self, height: usize) {
        self.viewport_height = height.max(1);
    }

    /// Ensure the selected item is visible in the viewport
    pub fn ensure_visible(&mut self) {
        if self.visible.is_empty() {
            self.scroll_offset = 0;
            return;
        }

        let margin = 2;
        if self.selected < self.scroll_offset + margin {
            self.scroll_offset = self.selected.saturating_sub(margin);
        } else if self.selected >= self.scroll_offset + self.viewport_height.saturating_sub(margin) {
            self.scroll_offset = self
                .selected
                .saturating_sub(self.viewport_height.saturating_sub(margin + 1));
        }

        let max_offset = self.visible.len().saturating_sub(self.viewport_height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
    }

    /// Range of visible rows based on scroll offset and viewport
    pub fn visible_range(&self) -> Range<usize> {
        let start = self.scroll_offset.min(self.visible.len());
        let end = (self.scroll_offset + self.viewport_height).min(self.visible.len());
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::auth::GcpCredentials;
    use crate::gcp::client::{Endpoints, GcpClient};

    fn app() -> App {
        let client = GcpClient::with_credentials(
            GcpCredentials::fixed("t"),
            "my-project-123",
            Endpoints::all("http://127.0.0.1:9"),
        )
        .unwrap();
        App::new(LoggingDataSource::new(client), Config::default())
    }

    fn entry(msg: &str) -> LogEntry {
        LogEntry {
            text_payload: Some(msg.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tick_mirrors_sink() {
        let mut app = app();
        app.sink.lock().append(vec![entry("error: disk full"), entry("ok")]);
        app.tick().await;
        assert_eq!(app.visible.len(), 2);

        app.search_text = "ERR".to_string();
        app.apply_search();
        app.tick().await;
        assert_eq!(app.visible.len(), 1);
        assert_eq!(app.total_count, 2);
    }

    #[tokio::test]
    async fn test_selection_clamped_after_search() {
        let mut app = app();
        app.sink.lock().append(vec![entry("a"), entry("b"), entry("c")]);
        app.tick().await;
        app.go_to_bottom();
        assert_eq!(app.selected, 2);

        app.search_text = "a".to_string();
        app.apply_search();
        app.tick().await;
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_current_filter_uses_selections() {
        let mut app = app();
        app.resource_type = Some("gce_instance".into());
        app.severity = Some(LogSeverity::Error);
        app.log_id = Some("syslog".into());
        app.time_bound = TimeBound::before("2024-01-01T00:00:00Z".parse().unwrap());

        let filter = app.current_filter(Utc::now()).unwrap();
        assert_eq!(
            filter,
            "resource.type=\"gce_instance\"\nseverity>=ERROR\ntimestamp<=\"2024-01-01T00:00:00Z\"\nlogName=\"projects/my-project-123/logs/syslog\"\n"
        );
    }

    #[test]
    fn test_severity_selector_all() {
        let mut app = app();
        app.severity = Some(LogSeverity::Error);
        app.open_selector(SelectorKind::Severity);
        let selector = app.selector.as_mut().unwrap();
        assert_eq!(selector.items[selector.selected], "ERROR");

        selector.selected = selector.items.len() - 1;
        assert!(app.apply_selector());
        assert_eq!(app.severity, None);
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn test_log_id_selector() {
        let mut app = app();
        app.log_ids = Some(vec!["stdout".into(), "stderr".into()]);
        app.open_selector(SelectorKind::LogId);
        app.next();
        app.next();
        assert!(app.apply_selector());
        assert_eq!(app.log_id.as_deref(), Some("stderr"));
    }

    #[test]
    fn test_empty_resource_selector_shows_error() {
        let mut app = app();
        app.open_selector(SelectorKind::Resource);
        assert!(app.selector.is_none());
        assert!(app.error_message.is_some());
    }

    #[test]
    fn test_toggle_advanced_seeds_text() {
        let mut app = app();
        app.severity = Some(LogSeverity::Warning);
        app.time_bound = TimeBound::before("2024-01-01T00:00:00Z".parse().unwrap());
        app.toggle_advanced();
        assert!(app.show_advanced);
        assert_eq!(
            app.advanced_text,
            "severity>=WARNING timestamp<=\"2024-01-01T00:00:00Z\""
        );
        app.toggle_advanced();
        assert!(!app.show_advanced);
        assert!(app.advanced_text.is_empty());
    }

    #[tokio::test]
    async fn test_visible_range_scrolled() {
        let mut app = app();
        app.sink
            .lock()
            .append((0..100).map(|i| entry(&i.to_string())).collect());
        app.tick().await;
        app.update_viewport(10);
        app.selected = 50;
        app.ensure_visible();
        let range = app.visible_range();
        assert!(range.contains(&50));
        assert_eq!(range.len(), 10);
    }
}
