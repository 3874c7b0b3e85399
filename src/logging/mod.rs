//! Cloud Logging viewer core
//!
//! # Architecture
//!
//! - [`filter`] - Composes the query from the viewer selections
//! - [`source`] - Fetches one page of entries (and selector catalogues)
//! - [`retrieval`] - Pages until enough entries, exhaustion or cancellation
//! - [`sink`] - Append-only result store with events and quick search
//! - [`entry`] - Log entry model
//! - [`tree`] - Detail tree of a single entry
//! - [`catalog`] - Resource types and log ids for the selectors

pub mod catalog;
pub mod entry;
pub mod filter;
pub mod retrieval;
pub mod sink;
pub mod source;
pub mod tree;

pub use entry::{LogEntry, LogSeverity};
pub use filter::{compose_advanced_filter, compose_simple_filter, FilterSelection, SortOrder, TimeBound};
pub use retrieval::{LogRetriever, RetrievalOutcome, RetrievalState, DEFAULT_PAGE_SIZE};
pub use sink::{LogSink, SharedSink, SinkEvent};
pub use source::{FetchError, ListLogEntriesRequest, LogEntryPage, LogSource, LoggingDataSource};
