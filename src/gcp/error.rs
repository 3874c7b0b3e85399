//! Data source errors
//!
//! Typed failures for calls against GCP REST APIs. These are the errors the
//! log viewer surfaces to the user; cancellation is modelled separately by
//! the callers that support it.

/// Failure of a remote GCP call
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    /// The API answered with a non-success status
    #[error("API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

impl DataSourceError {
    /// HTTP status of the failed call, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Message suitable for display in the status bar.
    ///
    /// Client errors (400, 404, 409) carry the server's explanation, which is
    /// how a rejected filter gets diagnosed. Auth, quota and server failures
    /// keep a fixed text.
    pub fn user_message(&self) -> String {
        if let Self::Auth(_) = self {
            return "Authentication failed. Run 'gcloud auth application-default login'."
                .to_string();
        }

        if let Self::Api { status, message } = self {
            let message = message.trim();
            if !message.is_empty() {
                match status {
                    400 => return format!("Invalid request: {}", message),
                    404 => return format!("Resource not found: {}", message),
                    409 => return format!("Resource conflict: {}", message),
                    _ => {},
                }
            }
        }

        match self.status() {
            Some(403) => "Permission denied. Check your GCP IAM permissions.".to_string(),
            Some(401) => {
                "Authentication failed. Run 'gcloud auth application-default login'.".to_string()
            },
            Some(404) => "Resource not found.".to_string(),
            Some(429) => "Rate limit exceeded. Please try again later.".to_string(),
            Some(400) => "Invalid request. Check your filter and parameters.".to_string(),
            Some(409) => {
                "Resource conflict. The resource may already exist or be in use.".to_string()
            },
            Some(s) if s >= 500 => {
                "GCP service temporarily unavailable. Please try again.".to_string()
            },
            Some(_) => "Request failed. Check your network connection and try again.".to_string(),
            None => match self {
                Self::Decode(_) => "Unexpected response from GCP.".to_string(),
                _ => "Request failed. Check your network connection and try again.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> DataSourceError {
        DataSourceError::Api {
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(api(404).to_string(), "API request failed: 404 - boom");
    }

    #[test]
    fn test_user_message_by_status() {
        assert!(api(403).user_message().contains("Permission denied"));
        assert!(api(401).user_message().contains("gcloud auth"));
        assert!(api(404).user_message().starts_with("Resource not found"));
        assert!(api(429).user_message().contains("Rate limit"));
        assert!(api(503).user_message().contains("temporarily unavailable"));
        assert!(api(418).user_message().contains("Request failed"));
    }

    #[test]
    fn test_user_message_surfaces_filter_error() {
        let err = DataSourceError::Api {
            status: 400,
            message: "Unparseable filter: syntax error at line 1, column 9".to_string(),
        };
        assert_eq!(
            err.user_message(),
            "Invalid request: Unparseable filter: syntax error at line 1, column 9"
        );
    }

    #[test]
    fn test_user_message_fixed_text_without_detail() {
        // Empty detail falls back to the status text
        let err = DataSourceError::Api {
            status: 400,
            message: "  ".to_string(),
        };
        assert_eq!(
            err.user_message(),
            "Invalid request. Check your filter and parameters."
        );

        // Quota and server failures never echo the body
        assert!(!api(429).user_message().contains("boom"));
        assert!(!api(503).user_message().contains("boom"));
        assert_eq!(api(409).user_message(), "Resource conflict: boom");
    }

    #[test]
    fn test_auth_error_message() {
        let err = DataSourceError::Auth("no credentials".to_string());
        assert_eq!(err.status(), None);
        assert!(err.user_message().contains("Authentication failed"));
    }
}
