//! Filter Composer
//!
//! Turns the discrete viewer selections into a Cloud Logging query. Clauses
//! are emitted in a fixed order, one per line (the query language treats
//! newlines as AND). No validation is done on free text; malformed text is
//! passed through for the server to reject.

use super::entry::LogSeverity;
use chrono::{DateTime, SecondsFormat, Utc};

/// Order in which entries are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Newest first
    #[default]
    Descending,
    /// Oldest first
    Ascending,
}

impl SortOrder {
    /// `orderBy` value for `entries:list`
    pub fn as_order_by(&self) -> &'static str {
        match self {
            Self::Descending => "timestamp desc",
            Self::Ascending => "timestamp asc",
        }
    }
}

/// Anchor of the time window, read together with the sort order:
/// descending shows entries at or before `at`, ascending at or after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBound {
    pub at: DateTime<Utc>,
    pub order: SortOrder,
}

impl TimeBound {
    pub fn before(at: DateTime<Utc>) -> Self {
        Self {
            at,
            order: SortOrder::Descending,
        }
    }

    pub fn after(at: DateTime<Utc>) -> Self {
        Self {
            at,
            order: SortOrder::Ascending,
        }
    }

    /// Clause for this bound, if any. A descending bound in the future is
    /// equivalent to no bound and is omitted.
    pub fn clause(&self, now: DateTime<Utc>) -> Option<String> {
        match self.order {
            SortOrder::Descending if self.at < now => {
                Some(format!("timestamp<=\"{}\"", format_timestamp(self.at)))
            },
            SortOrder::Descending => None,
            SortOrder::Ascending => Some(format!("timestamp>=\"{}\"", format_timestamp(self.at))),
        }
    }
}

/// RFC 3339 UTC with a `Z` suffix and only the fractional digits needed
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Current state of the simple filter selectors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSelection {
    pub resource_type: Option<String>,
    /// `None` means all severities
    pub severity: Option<LogSeverity>,
    pub time_bound: Option<TimeBound>,
    /// Fully-qualified log name (`projects/<p>/logs/<id>`)
    pub log_name: Option<String>,
    pub search_text: Option<String>,
}

impl FilterSelection {
    /// Order implied by the time bound (descending when unbounded)
    pub fn order(&self) -> SortOrder {
        self.time_bound.map(|b| b.order).unwrap_or_default()
    }
}

/// Expand free text into an OR-group of quoted terms.
/// Returns `None` when the text has no terms.
pub fn compose_text_search(text: Option<&str>) -> Option<String> {
    let terms: Vec<String> = text?
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        return None;
    }

    Some(format!("( {} )", terms.join(" OR ")))
}

/// Aggregate all selections into a filter string.
/// Returns `None` when no clause applies.
pub fn compose_simple_filter(selection: &FilterSelection, now: DateTime<Utc>) -> Option<String> {
    let mut filter = String::new();
    let mut push = |clause: String| {
        filter.push_str(&clause);
        filter.push('\n');
    };

    if let Some(resource_type) = selection.resource_type.as_deref() {
        push(format!("resource.type=\"{}\"", resource_type));
    }

    if let Some(severity) = selection.severity {
        push(format!("severity>={}", severity.as_str()));
    }

    if let Some(clause) = selection.time_bound.and_then(|b| b.clause(now)) {
        push(clause);
    }

    if let Some(log_name) = selection.log_name.as_deref() {
        push(format!("logName=\"{}\"", log_name));
    }

    if let Some(text) = compose_text_search(selection.search_text.as_deref()) {
        push(text);
    }

    if filter.is_empty() {
        None
    } else {
        Some(filter)
    }
}

/// Use a hand-written filter, adding the time bound unless the text already
/// constrains `timestamp` itself.
pub fn compose_advanced_filter(
    text: &str,
    bound: Option<TimeBound>,
    now: DateTime<Utc>,
) -> Option<String> {
    let mut filter = String::new();
    if !text.trim().is_empty() {
        filter.push_str(text);
        if !text.ends_with('\n') {
            filter.push('\n');
        }
    }

    if !text.to_lowercase().contains("timestamp") {
        if let Some(clause) = bound.and_then(|b| b.clause(now)) {
            filter.push_str(&clause);
            filter.push('\n');
        }
    }

    if filter.is_empty() {
        None
    } else {
        Some(filter)
    }
}
