//! Retrieval Loop
//!
//! Repeatedly asks the [`LogSource`] for pages until enough entries have
//! arrived, the server runs out of pages, or the caller cancels.
//!
//! On complex filters the server may scan for a while and answer with empty
//! pages that still carry a continuation token. Those are not the end of the
//! stream: the loop keeps asking, with the same page size, until entries show
//! up or the token disappears.
//!
//! Only one retrieval runs at a time. A second request while one is in
//! flight returns [`RetrievalOutcome::Busy`] and changes nothing.

use super::filter::SortOrder;
use super::sink::SharedSink;
use super::source::{FetchError, ListLogEntriesRequest, LogSource};
use crate::gcp::DataSourceError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Entries to accumulate per invocation; also the page size of every request
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// How an invocation ended (errors are returned separately)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Reached the target count; more pages are available
    Completed { fetched: usize },
    /// Server signalled there is nothing more to read
    Exhausted { fetched: usize },
    /// Stopped on request; pages appended before the stop remain
    Cancelled { fetched: usize },
    /// Another retrieval was already in flight
    Busy,
    /// `load_next_page` with no continuation token held
    NoMorePages,
}

/// Snapshot of the loop's progress, for status bars
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalState {
    pub is_loading: bool,
    pub cancellation_requested: bool,
    pub accumulated_count: usize,
    pub has_more: bool,
    /// User-visible message of the last data source failure
    pub last_error: Option<String>,
}

#[derive(Default)]
struct LoopState {
    filter: Option<String>,
    order: SortOrder,
    next_page_token: Option<String>,
    cancel: Option<CancellationToken>,
    accumulated_count: usize,
    last_error: Option<String>,
}

/// Clears the busy flag on every exit path
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct LogRetriever<S> {
    source: S,
    sink: SharedSink,
    page_size: usize,
    loading: AtomicBool,
    state: Mutex<LoopState>,
}

impl<S: LogSource> LogRetriever<S> {
    pub fn new(source: S, sink: SharedSink) -> Self {
        Self::with_page_size(source, sink, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(source: S, sink: SharedSink, page_size: usize) -> Self {
        Self {
            source,
            sink,
            page_size: page_size.max(1),
            loading: AtomicBool::new(false),
            state: Mutex::new(LoopState::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RetrievalState {
        let state = self.lock_state();
        RetrievalState {
            is_loading: self.is_loading(),
            cancellation_requested: state
                .cancel
                .as_ref()
                .map(|c| c.is_cancelled())
                .unwrap_or(false),
            accumulated_count: state.accumulated_count,
            has_more: state.next_page_token.is_some(),
            last_error: state.last_error.clone(),
        }
    }

    /// Filter of the current query
    pub fn filter(&self) -> Option<String> {
        self.lock_state().filter.clone()
    }

    /// Ask the running retrieval to stop after the current page.
    /// Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let state = self.lock_state();
        match state.cancel.as_ref() {
            Some(token) if self.is_loading() => {
                tracing::debug!("Cancelling log retrieval");
                token.cancel();
                true
            },
            _ => false,
        }
    }

    /// Forget the continuation token. Used when the user's filter changes,
    /// so "next page" cannot extend a query built on the old one.
    pub fn discard_next_page(&self) {
        self.lock_state().next_page_token = None;
    }

    /// Start a new query: clear the sink and the token, then fetch.
    pub async fn reload(
        &self,
        filter: Option<String>,
        order: SortOrder,
    ) -> Result<RetrievalOutcome, DataSourceError> {
        self.reload_within(filter, order, &CancellationToken::new())
            .await
    }

    /// Continue the current query from the held token.
    pub async fn load_next_page(&self) -> Result<RetrievalOutcome, DataSourceError> {
        self.load_next_page_within(&CancellationToken::new()).await
    }

    /// Start a query and keep reading up to `invocations` page sets.
    ///
    /// `stop` covers the whole run: it cancels the invocation in flight and
    /// is checked before the next one starts, so a stop that lands between
    /// two invocations still ends the run. The returned count is the total
    /// across invocations.
    pub async fn load_pages(
        &self,
        filter: Option<String>,
        order: SortOrder,
        invocations: usize,
        stop: &CancellationToken,
    ) -> Result<RetrievalOutcome, DataSourceError> {
        let mut total = 0;
        let mut outcome = self.reload_within(filter, order, stop).await?;

        for _ in 1..invocations {
            match outcome {
                RetrievalOutcome::Completed { fetched } => total += fetched,
                _ => break,
            }
            if stop.is_cancelled() {
                tracing::info!("Log retrieval stopped between page sets");
                self.lock_state().next_page_token = None;
                return Ok(RetrievalOutcome::Cancelled { fetched: total });
            }
            outcome = self.load_next_page_within(stop).await?;
        }

        Ok(match outcome {
            RetrievalOutcome::Completed { fetched } => RetrievalOutcome::Completed {
                fetched: total + fetched,
            },
            RetrievalOutcome::Exhausted { fetched } => RetrievalOutcome::Exhausted {
                fetched: total + fetched,
            },
            RetrievalOutcome::Cancelled { fetched } => RetrievalOutcome::Cancelled {
                fetched: total + fetched,
            },
            other => other,
        })
    }

    async fn reload_within(
        &self,
        filter: Option<String>,
        order: SortOrder,
        parent: &CancellationToken,
    ) -> Result<RetrievalOutcome, DataSourceError> {
        let Some(_busy) = BusyGuard::acquire(&self.loading) else {
            tracing::debug!("Retrieval already in flight, skipping reload");
            return Ok(RetrievalOutcome::Busy);
        };

        // Child of the caller's token: cancel() only reaches this invocation
        let cancel = parent.child_token();
        {
            let mut state = self.lock_state();
            state.filter = filter;
            state.order = order;
            state.next_page_token = None;
            state.cancel = Some(cancel.clone());
            state.last_error = None;
        }
        self.sink.lock().clear();

        self.run(cancel).await
    }

    async fn load_next_page_within(
        &self,
        parent: &CancellationToken,
    ) -> Result<RetrievalOutcome, DataSourceError> {
        let Some(_busy) = BusyGuard::acquire(&self.loading) else {
            tracing::debug!("Retrieval already in flight, skipping next page");
            return Ok(RetrievalOutcome::Busy);
        };

        let cancel = parent.child_token();
        {
            let mut state = self.lock_state();
            if state.next_page_token.is_none() {
                return Ok(RetrievalOutcome::NoMorePages);
            }
            state.cancel = Some(cancel.clone());
            state.last_error = None;
        }

        self.run(cancel).await
    }

    async fn run(&self, cancel: CancellationToken) -> Result<RetrievalOutcome, DataSourceError> {
        let (filter, order) = {
            let mut state = self.lock_state();
            state.accumulated_count = 0;
            (state.filter.clone(), state.order)
        };

        let result = self.fetch_pages(filter, order, &cancel).await;

        let mut state = self.lock_state();
        state.cancel = None;
        match &result {
            Ok(RetrievalOutcome::Cancelled { fetched }) => {
                tracing::info!("Log retrieval cancelled after {} entries", fetched);
                state.next_page_token = None;
            },
            Ok(outcome) => {
                tracing::debug!("Log retrieval finished: {:?}", outcome);
            },
            Err(e) => {
                tracing::warn!("Log retrieval failed: {}", e);
                state.next_page_token = None;
                state.last_error = Some(e.user_message());
            },
        }
        result
    }

    async fn fetch_pages(
        &self,
        filter: Option<String>,
        order: SortOrder,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome, DataSourceError> {
        let mut count = 0;

        while count < self.page_size && !cancel.is_cancelled() {
            let page_token = self.lock_state().next_page_token.clone();
            tracing::debug!("Loading logs, count={}, first_page={}", count, page_token.is_none());

            // Always the full page size: the server requires the same size
            // when continuing from a token
            let request = ListLogEntriesRequest {
                filter: filter.clone(),
                order,
                page_size: self.page_size,
                page_token,
            };

            let page = match self.source.list_log_entries(&request, cancel).await {
                Ok(page) => page,
                Err(FetchError::Cancelled) => return Ok(RetrievalOutcome::Cancelled { fetched: count }),
                Err(FetchError::DataSource(e)) => return Err(e),
            };

            count += self.sink.lock().append(page.entries);

            let exhausted = page.next_page_token.is_none();
            {
                let mut state = self.lock_state();
                state.next_page_token = page.next_page_token;
                state.accumulated_count = count;
            }

            if exhausted {
                return Ok(RetrievalOutcome::Exhausted { fetched: count });
            }
        }

        if cancel.is_cancelled() {
            Ok(RetrievalOutcome::Cancelled { fetched: count })
        } else {
            Ok(RetrievalOutcome::Completed { fetched: count })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::entry::LogEntry;
    use crate::logging::source::LogEntryPage;
    use std::collections::VecDeque;

    /// Serves a scripted list of pages and records every request
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<LogEntryPage, u16>>>,
        requests: Mutex<Vec<ListLogEntriesRequest>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<LogEntryPage, u16>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ListLogEntriesRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl LogSource for ScriptedSource {
        async fn list_log_entries(
            &self,
            request: &ListLogEntriesRequest,
            _cancel: &CancellationToken,
        ) -> Result<LogEntryPage, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.pages.lock().unwrap().pop_front() {
                Some(Ok(page)) => Ok(page),
                Some(Err(status)) => Err(FetchError::DataSource(DataSourceError::Api {
                    status,
                    message: "scripted".into(),
                })),
                None => panic!("unexpected request"),
            }
        }
    }

    fn page(n: usize, token: Option<&str>) -> Result<LogEntryPage, u16> {
        Ok(LogEntryPage {
            entries: (0..n)
                .map(|i| LogEntry {
                    text_payload: Some(format!("entry {}", i)),
                    ..Default::default()
                })
                .collect(),
            next_page_token: token.map(|t| t.to_string()),
        })
    }

    fn retriever(pages: Vec<Result<LogEntryPage, u16>>) -> LogRetriever<ScriptedSource> {
        LogRetriever::new(ScriptedSource::new(pages), SharedSink::new())
    }

    #[tokio::test]
    async fn test_empty_pages_with_token_keep_loading() {
        let r = retriever(vec![page(0, Some("a")), page(0, Some("b")), page(3, None)]);

        let outcome = r.reload(None, SortOrder::Descending).await.unwrap();

        assert_eq!(outcome, RetrievalOutcome::Exhausted { fetched: 3 });
        let tokens: Vec<Option<String>> =
            r.source().requests().into_iter().map(|q| q.page_token).collect();
        assert_eq!(tokens, vec![None, Some("a".into()), Some("b".into())]);
        assert_eq!(r.sink().lock().len(), 3);
    }

    #[tokio::test]
    async fn test_stops_at_target_and_keeps_token() {
        let r = retriever(vec![page(60, Some("a")), page(60, Some("b"))]);

        let outcome = r.reload(Some("f".into()), SortOrder::Ascending).await.unwrap();

        assert_eq!(outcome, RetrievalOutcome::Completed { fetched: 120 });
        let state = r.state();
        assert!(state.has_more);
        assert!(!state.is_loading);
        assert_eq!(state.accumulated_count, 120);
        for request in r.source().requests() {
            assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
            assert_eq!(request.filter.as_deref(), Some("f"));
            assert_eq!(request.order, SortOrder::Ascending);
        }
    }

    #[tokio::test]
    async fn test_next_page_continues_from_token() {
        let r = retriever(vec![page(100, Some("a")), page(5, None)]);
        r.reload(None, SortOrder::Descending).await.unwrap();

        let outcome = r.load_next_page().await.unwrap();

        assert_eq!(outcome, RetrievalOutcome::Exhausted { fetched: 5 });
        assert_eq!(r.source().requests()[1].page_token.as_deref(), Some("a"));
        // Next page appends rather than replacing
        assert_eq!(r.sink().lock().len(), 105);
        assert_eq!(r.load_next_page().await.unwrap(), RetrievalOutcome::NoMorePages);
    }

    #[tokio::test]
    async fn test_discarded_token_ends_paging() {
        let r = retriever(vec![page(100, Some("a")), page(5, None)]);
        r.reload(None, SortOrder::Descending).await.unwrap();
        assert!(r.state().has_more);

        r.discard_next_page();

        assert!(!r.state().has_more);
        assert_eq!(r.load_next_page().await.unwrap(), RetrievalOutcome::NoMorePages);
        assert_eq!(r.source().requests().len(), 1);
        // Loaded entries stay
        assert_eq!(r.sink().lock().len(), 100);
    }

    #[tokio::test]
    async fn test_reload_clears_previous_results() {
        let r = retriever(vec![page(2, None), page(1, None)]);
        r.reload(None, SortOrder::Descending).await.unwrap();
        r.reload(None, SortOrder::Descending).await.unwrap();
        assert_eq!(r.sink().lock().len(), 1);
    }

    #[tokio::test]
    async fn test_data_source_failure_is_reported() {
        let r = retriever(vec![page(10, Some("a")), Err(403)]);

        let err = r.reload(None, SortOrder::Descending).await.unwrap_err();

        assert_eq!(err.status(), Some(403));
        let state = r.state();
        assert!(!state.is_loading);
        assert!(!state.has_more);
        assert!(state.last_error.unwrap().contains("Permission denied"));
        // The page before the failure stays visible
        assert_eq!(r.sink().lock().len(), 10);
    }

    #[tokio::test]
    async fn test_busy_flag_rejects_second_request() {
        let r = retriever(vec![]);
        let _held = BusyGuard::acquire(&r.loading).unwrap();

        assert_eq!(
            r.reload(None, SortOrder::Descending).await.unwrap(),
            RetrievalOutcome::Busy
        );
        assert!(r.source().requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let r = retriever(vec![]);
        assert!(!r.cancel());
    }
}
