//! Result Sink
//!
//! Append-only, ordered store of fetched entries. Consumers either read
//! snapshots or subscribe to [`SinkEvent`]s. The quick search is a view-side
//! predicate only: it never touches the stored entries or pagination.

use super::entry::LogEntry;
use chrono::{NaiveDate, TimeZone};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification pushed to subscribers
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// New entries were appended, in order
    Appended(Vec<Arc<LogEntry>>),
    /// All entries were dropped (new query)
    Cleared,
    /// The quick search changed; visible entries must be recomputed
    FilterChanged,
}

pub struct LogSink {
    entries: Vec<Arc<LogEntry>>,
    search_text: Option<String>,
    /// Lowercased search terms; empty means "show everything"
    search_terms: Vec<String>,
    events: broadcast::Sender<SinkEvent>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Vec::new(),
            search_text: None,
            search_terms: Vec::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: SinkEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append a page of entries, returning how many were added
    pub fn append(&mut self, entries: Vec<LogEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }

        let added: Vec<Arc<LogEntry>> = entries.into_iter().map(Arc::new).collect();
        let count = added.len();
        self.entries.extend(added.iter().cloned());
        self.notify(SinkEvent::Appended(added));
        count
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.notify(SinkEvent::Cleared);
    }

    pub fn entries(&self) -> &[Arc<LogEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn search_text(&self) -> Option<&str> {
        self.search_text.as_deref()
    }

    /// Set the quick search. Blank text removes it.
    pub fn set_search_text(&mut self, text: Option<&str>) {
        let text = text.filter(|t| !t.trim().is_empty());
        self.search_text = text.map(|t| t.to_string());
        self.search_terms = text
            .map(|t| {
                t.split(' ')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();
        self.notify(SinkEvent::FilterChanged);
    }

    /// Whether an entry passes the quick search: any term is a
    /// case-insensitive substring of its message
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.search_terms.is_empty() {
            return true;
        }
        let message = entry.message().to_lowercase();
        self.search_terms.iter().any(|term| message.contains(term))
    }

    /// Entries passing the quick search, in arrival order
    pub fn visible(&self) -> Vec<Arc<LogEntry>> {
        self.entries
            .iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect()
    }

    /// Visible entries grouped by calendar date in `tz`. Groups are ordered
    /// by first appearance; entries without a timestamp share a `None` group.
    pub fn group_by_date<Tz: TimeZone>(
        &self,
        tz: &Tz,
    ) -> Vec<(Option<NaiveDate>, Vec<Arc<LogEntry>>)> {
        let mut groups: Vec<(Option<NaiveDate>, Vec<Arc<LogEntry>>)> = Vec::new();

        for entry in self.entries.iter().filter(|e| self.matches(e)) {
            let date = entry.date_in(tz);
            match groups.iter_mut().find(|(d, _)| *d == date) {
                Some((_, items)) => items.push(entry.clone()),
                None => groups.push((date, vec![entry.clone()])),
            }
        }

        groups
    }
}

/// Sink shared between the retrieval loop (writer) and the presentation layer
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<LogSink>>);

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for a short, non-async section. A poisoned lock still holds
    /// consistent data (every mutation is a single push/clear), so recover it.
    pub fn lock(&self) -> MutexGuard<'_, LogSink> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.lock().subscribe()
    }
}
