//! GCP Client
//!
//! The context object threaded through every data source: credentials,
//! HTTP client, API endpoints and the current project.

use super::auth::GcpCredentials;
use super::error::DataSourceError;
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use url::Url;

pub const DEFAULT_LOGGING_ENDPOINT: &str = "https://logging.googleapis.com";
pub const DEFAULT_ERROR_REPORTING_ENDPOINT: &str = "https://clouderrorreporting.googleapis.com";
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Base URLs of the APIs used by tglogs.
/// Overridable for emulators and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_logging")]
    pub logging: String,
    #[serde(default = "default_error_reporting")]
    pub error_reporting: String,
    #[serde(default = "default_pubsub")]
    pub pubsub: String,
}

fn default_logging() -> String {
    DEFAULT_LOGGING_ENDPOINT.to_string()
}

fn default_error_reporting() -> String {
    DEFAULT_ERROR_REPORTING_ENDPOINT.to_string()
}

fn default_pubsub() -> String {
    DEFAULT_PUBSUB_ENDPOINT.to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            logging: default_logging(),
            error_reporting: default_error_reporting(),
            pubsub: default_pubsub(),
        }
    }
}

impl Endpoints {
    /// Point every API at the same base URL
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            logging: base.clone(),
            error_reporting: base.clone(),
            pubsub: base,
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub project_id: String,
    pub endpoints: Endpoints,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new(project_id: &str, endpoints: Endpoints) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(credentials, project_id, endpoints)
    }

    /// Create a client around existing credentials
    pub fn with_credentials(
        credentials: GcpCredentials,
        project_id: &str,
        endpoints: Endpoints,
    ) -> Result<Self> {
        let http = GcpHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            project_id: project_id.to_string(),
            endpoints,
        })
    }

    async fn token(&self) -> Result<String, DataSourceError> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| DataSourceError::Auth(format!("{e:#}")))
    }

    /// Run a request, retrying once with a fresh token when the cached one
    /// is rejected
    async fn with_token<F, Fut>(&self, call: F) -> Result<Value, DataSourceError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Value, DataSourceError>>,
    {
        let token = self.token().await?;
        match call(token).await {
            Err(e) if e.status() == Some(401) && self.credentials.can_refresh() => {
                tracing::debug!("Access token rejected, refreshing");
                let token = self
                    .credentials
                    .refresh_token()
                    .await
                    .map_err(|e| DataSourceError::Auth(format!("{e:#}")))?;
                call(token).await
            },
            result => result,
        }
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value, DataSourceError> {
        self.with_token(|token| async move { self.http.get(url, &token).await })
            .await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, DataSourceError> {
        self.with_token(|token| async move { self.http.post(url, &token, body).await })
            .await
    }

    /// Make a PUT request to a GCP API
    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, DataSourceError> {
        self.with_token(|token| async move { self.http.put(url, &token, body).await })
            .await
    }

    /// `projects/<id>`, the resource name most APIs key on
    pub fn project_resource(&self) -> String {
        format!("projects/{}", self.project_id)
    }

    // =========================================================================
    // Cloud Logging API helpers
    // =========================================================================

    /// Build Cloud Logging API URL
    pub fn logging_url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.endpoints.logging.trim_end_matches('/'), path)
    }

    /// Build project-scoped Cloud Logging API URL
    pub fn logging_project_url(&self, path: &str) -> String {
        self.logging_url(&format!("{}/{}", self.project_resource(), path))
    }

    // =========================================================================
    // Error Reporting API helpers
    // =========================================================================

    /// Build Error Reporting API URL
    pub fn error_reporting_url(&self, path: &str) -> String {
        format!(
            "{}/v1beta1/{}/{}",
            self.endpoints.error_reporting.trim_end_matches('/'),
            self.project_resource(),
            path
        )
    }

    // =========================================================================
    // Pub/Sub API helpers
    // =========================================================================

    /// Build Pub/Sub API URL
    pub fn pubsub_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.endpoints.pubsub.trim_end_matches('/'),
            self.project_resource(),
            path
        )
    }
}

/// Append query parameters to a URL, skipping empty values
pub fn with_query(url: &str, params: &[(&str, Option<&str>)]) -> Result<String, DataSourceError> {
    let mut url = Url::parse(url)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                pairs.append_pair(key, value);
            }
        }
    }
    // An empty `?` is left behind when every value was skipped
    let mut out = url.to_string();
    if out.ends_with('?') {
        out.pop();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        GcpClient::with_credentials(
            GcpCredentials::fixed("t"),
            "my-project-123",
            Endpoints::all("http://localhost:9000/"),
        )
        .unwrap()
    }

    #[test]
    fn test_url_builders() {
        let c = client();
        assert_eq!(
            c.logging_url("entries:list"),
            "http://localhost:9000/v2/entries:list"
        );
        assert_eq!(
            c.logging_project_url("logs"),
            "http://localhost:9000/v2/projects/my-project-123/logs"
        );
        assert_eq!(
            c.error_reporting_url("groupStats"),
            "http://localhost:9000/v1beta1/projects/my-project-123/groupStats"
        );
        assert_eq!(
            c.pubsub_url("topics/t1"),
            "http://localhost:9000/v1/projects/my-project-123/topics/t1"
        );
    }

    #[test]
    fn test_with_query_skips_empty() {
        let url = with_query(
            "http://localhost/v2/logs",
            &[("pageToken", None), ("pageSize", Some("100")), ("x", Some(""))],
        )
        .unwrap();
        assert_eq!(url, "http://localhost/v2/logs?pageSize=100");

        let bare = with_query("http://localhost/v2/logs", &[("pageToken", None)]).unwrap();
        assert_eq!(bare, "http://localhost/v2/logs");
    }

    #[test]
    fn test_default_endpoints() {
        let e = Endpoints::default();
        assert_eq!(e.logging, DEFAULT_LOGGING_ENDPOINT);
        assert_eq!(e.pubsub, DEFAULT_PUBSUB_ENDPOINT);
    }
}
