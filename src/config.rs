//! Configuration Management
//!
//! Handles persistent configuration storage for tglogs.

use crate::gcp::client::Endpoints;
use crate::logging::LogSeverity;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Last used project ID
    #[serde(default)]
    pub project_id: Option<String>,
    /// Resource type selected when the viewer opens
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Minimum severity selected when the viewer opens (all when unset)
    #[serde(default)]
    pub severity: Option<LogSeverity>,
    /// Show timestamps in UTC instead of local time
    #[serde(default)]
    pub utc: bool,
    /// API endpoint overrides
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Config {
    /// Directory holding config and log files
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tglogs"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                Self::default()
            },
        }
    }

    /// Parse configuration, falling back to defaults on malformed input
    pub fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config: {}", e);
            Self::default()
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective project (config > environment/gcloud default)
    pub fn effective_project(&self) -> String {
        self.project_id
            .clone()
            .or_else(crate::gcp::auth::get_default_project)
            .unwrap_or_default()
    }

    /// Set project and save
    pub fn set_project(&mut self, project_id: &str) -> Result<()> {
        self.project_id = Some(project_id.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let config = Config::parse(r#"{"project_id": "my-project-123", "severity": "ERROR"}"#);
        assert_eq!(config.project_id.as_deref(), Some("my-project-123"));
        assert_eq!(config.severity, Some(LogSeverity::Error));
        assert_eq!(config.endpoints, Endpoints::default());
        assert!(!config.utc);
    }

    #[test]
    fn test_parse_endpoint_override() {
        let config = Config::parse(r#"{"endpoints": {"pubsub": "http://localhost:8085"}}"#);
        assert_eq!(config.endpoints.pubsub, "http://localhost:8085");
        assert_eq!(
            config.endpoints.logging,
            crate::gcp::client::DEFAULT_LOGGING_ENDPOINT
        );
    }

    #[test]
    fn test_malformed_config_falls_back() {
        let config = Config::parse("{not json");
        assert!(config.project_id.is_none());
    }
}
