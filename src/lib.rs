//! tglogs - terminal viewer for Google Cloud Logging
//!
//! The [`logging`] module holds the retrieval core: filter composition, the
//! page fetcher, the cancellable retrieval loop and the result sink. The TUI
//! ([`app`], [`event`], [`ui`]) and the `query` command both read from it.

pub mod app;
pub mod config;
pub mod error_reporting;
pub mod event;
pub mod gcp;
pub mod logging;
pub mod pubsub;
pub mod ui;

/// Version injected at compile time via TGLOGS_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TGLOGS_VERSION") {
    Some(v) => v,
    None => "dev",
};
