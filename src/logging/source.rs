//! Page Fetcher
//!
//! One `entries:list` call per page, plus the catalogue lookups (resource
//! descriptors, log ids) the viewer needs to populate its selectors.

use super::catalog::MonitoredResourceDescriptor;
use super::entry::{ListLogEntriesResponse, LogEntry};
use super::filter::SortOrder;
use crate::gcp::client::with_query;
use crate::gcp::{DataSourceError, GcpClient};
use serde_json::{json, Value};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Parameters of one `entries:list` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLogEntriesRequest {
    pub filter: Option<String>,
    pub order: SortOrder,
    pub page_size: usize,
    pub page_token: Option<String>,
}

/// One page of results. `next_page_token` is `None` once the server has
/// nothing more to scan.
#[derive(Debug, Clone, Default)]
pub struct LogEntryPage {
    pub entries: Vec<LogEntry>,
    pub next_page_token: Option<String>,
}

impl From<ListLogEntriesResponse> for LogEntryPage {
    fn from(response: ListLogEntriesResponse) -> Self {
        Self {
            entries: response.entries,
            next_page_token: normalize_token(response.next_page_token),
        }
    }
}

/// Blank tokens mean "no more pages"
pub fn normalize_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

/// Why a page fetch did not produce a page
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request was cancelled")]
    Cancelled,

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

/// Source of log entry pages
pub trait LogSource: Send + Sync {
    /// Fetch one page. Must resolve to [`FetchError::Cancelled`] when `cancel`
    /// fires before the page is available.
    fn list_log_entries(
        &self,
        request: &ListLogEntriesRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<LogEntryPage, FetchError>> + Send;
}

/// Cloud Logging backed data source for one project
#[derive(Clone)]
pub struct LoggingDataSource {
    client: GcpClient,
}

impl LoggingDataSource {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GcpClient {
        &self.client
    }

    pub fn project_id(&self) -> &str {
        &self.client.project_id
    }

    fn list_body(&self, request: &ListLogEntriesRequest) -> Value {
        let mut body = json!({
            "resourceNames": [self.client.project_resource()],
            "orderBy": request.order.as_order_by(),
            "pageSize": request.page_size,
        });
        if let Value::Object(ref mut map) = body {
            if let Some(filter) = request.filter.as_deref() {
                map.insert("filter".to_string(), Value::String(filter.to_string()));
            }
            if let Some(token) = request.page_token.as_deref() {
                map.insert("pageToken".to_string(), Value::String(token.to_string()));
            }
        }
        body
    }

    /// All monitored resource descriptors, in server order
    pub async fn list_resource_descriptors(
        &self,
    ) -> Result<Vec<MonitoredResourceDescriptor>, DataSourceError> {
        let base = self.client.logging_url("monitoredResourceDescriptors");
        let pages = self.get_all_pages(&base, "resourceDescriptors").await?;

        let mut descriptors = Vec::with_capacity(pages.len());
        for item in pages {
            descriptors.push(serde_json::from_value(item)?);
        }
        Ok(descriptors)
    }

    /// Short ids of every log in the project (`syslog`, `cloudaudit.googleapis.com/activity`)
    pub async fn list_log_ids(&self) -> Result<Vec<String>, DataSourceError> {
        let base = self.client.logging_project_url("logs");
        let names = self.get_all_pages(&base, "logNames").await?;

        Ok(names
            .iter()
            .filter_map(|v| v.as_str())
            .map(super::catalog::log_id_from_name)
            .collect())
    }

    /// Follow `nextPageToken` until exhausted, collecting the array at `field`
    async fn get_all_pages(&self, base: &str, field: &str) -> Result<Vec<Value>, DataSourceError> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = with_query(base, &[("pageToken", page_token.as_deref())])?;
            let response = self.client.get(&url).await?;

            if let Some(items) = response.get(field).and_then(|v| v.as_array()) {
                all_items.extend(items.iter().cloned());
            }

            page_token = normalize_token(
                response
                    .get("nextPageToken")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            );
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_items)
    }
}

impl LogSource for LoggingDataSource {
    async fn list_log_entries(
        &self,
        request: &ListLogEntriesRequest,
        cancel: &CancellationToken,
    ) -> Result<LogEntryPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let url = self.client.logging_url("entries:list");
        let body = self.list_body(request);

        tracing::debug!(
            "entries:list filter={:?} order={} token={}",
            request.filter,
            request.order.as_order_by(),
            request.page_token.is_some()
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.client.post(&url, Some(&body)) => response?,
        };

        if response.is_null() {
            return Ok(LogEntryPage::default());
        }

        let parsed: ListLogEntriesResponse =
            serde_json::from_value(response).map_err(DataSourceError::from)?;
        Ok(parsed.into())
    }
}
