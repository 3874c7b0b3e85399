//! GCP API interaction module
//!
//! Authentication, the HTTP wrapper and the [`client::GcpClient`] context
//! object that every data source receives explicitly.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Client context (credentials, endpoints, project)
//! - [`error`] - Typed data source failures
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use tglogs::gcp::client::{Endpoints, GcpClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new("my-project", Endpoints::default()).await?;
//!     let logs = client.get(&client.logging_project_url("logs")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;

pub use client::GcpClient;
pub use error::DataSourceError;
