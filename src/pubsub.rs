//! Pub/Sub topics
//!
//! Topic listing and creation, with the console's naming rules checked
//! before anything is sent.

use crate::gcp::client::with_query;
use crate::gcp::{DataSourceError, GcpClient};
use regex::Regex;
use std::sync::OnceLock;

const TOPIC_NAME_MIN_LEN: usize = 3;
const TOPIC_NAME_MAX_LEN: usize = 255;

pub const TOPIC_NAME_HINT: &str = "Must be 3-255 characters, start with a letter, and contain only the following characters: letters, numbers, dashes (-), periods (.), underscores (_), tildes (~), percents (%) or plus signs (+). Cannot start with goog.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicNameError {
    #[error("Name must be between 3 and 255 characters")]
    Length,

    #[error("Name must start with a letter, and contain only the following characters: letters, numbers, dashes (-), periods (.), underscores (_), tildes (~), percents (%) or plus signs (+). Cannot start with goog.")]
    Format,
}

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error(transparent)]
    InvalidName(#[from] TopicNameError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

fn topic_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z]+[a-zA-Z0-9.\-_~%+]*$").expect("topic name pattern is valid")
    })
}

/// Check a short topic name against Pub/Sub naming rules
pub fn validate_topic_name(name: &str) -> Result<(), TopicNameError> {
    let len = name.chars().count();
    if !(TOPIC_NAME_MIN_LEN..=TOPIC_NAME_MAX_LEN).contains(&len) {
        return Err(TopicNameError::Length);
    }

    if name.to_ascii_lowercase().starts_with("goog") || !topic_name_regex().is_match(name) {
        return Err(TopicNameError::Format);
    }

    Ok(())
}

/// `projects/<p>/topics/`
pub fn topic_name_prefix(project_id: &str) -> String {
    format!("projects/{}/topics/", project_id)
}

/// Create a topic, returning its full resource name
pub async fn create_topic(client: &GcpClient, name: &str) -> Result<String, PubSubError> {
    validate_topic_name(name)?;

    let full_name = format!("{}{}", topic_name_prefix(&client.project_id), name);
    tracing::info!("Creating topic \"{}\"", full_name);

    let url = client.pubsub_url(&format!("topics/{}", urlencoding::encode(name)));
    client.put(&url, None).await?;

    tracing::info!("Topic \"{}\" has been created", full_name);
    Ok(full_name)
}

/// Full names of every topic in the project
pub async fn list_topics(client: &GcpClient) -> Result<Vec<String>, DataSourceError> {
    let base = client.pubsub_url("topics");
    let mut topics = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let url = with_query(&base, &[("pageToken", page_token.as_deref())])?;
        let response = client.get(&url).await?;

        if let Some(items) = response.get("topics").and_then(|v| v.as_array()) {
            topics.extend(
                items
                    .iter()
                    .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
                    .map(|s| s.to_string()),
            );
        }

        page_token = response
            .get("nextPageToken")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        if page_token.is_none() {
            break;
        }
    }

    Ok(topics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert_eq!(validate_topic_name("orders"), Ok(()));
        assert_eq!(validate_topic_name("my-topic.v2_a~b%c+d"), Ok(()));
        assert_eq!(validate_topic_name("abc"), Ok(()));
    }

    #[test]
    fn test_length_limits() {
        assert_eq!(validate_topic_name("ab"), Err(TopicNameError::Length));
        assert_eq!(validate_topic_name(""), Err(TopicNameError::Length));
        let long = format!("a{}", "b".repeat(255));
        assert_eq!(validate_topic_name(&long), Err(TopicNameError::Length));
        let max = format!("a{}", "b".repeat(254));
        assert_eq!(validate_topic_name(&max), Ok(()));
    }

    #[test]
    fn test_format_rules() {
        assert_eq!(validate_topic_name("1topic"), Err(TopicNameError::Format));
        assert_eq!(validate_topic_name("-topic"), Err(TopicNameError::Format));
        assert_eq!(validate_topic_name("top ic"), Err(TopicNameError::Format));
        assert_eq!(validate_topic_name("topic/x"), Err(TopicNameError::Format));
    }

    #[test]
    fn test_messages_describe_enforced_rule() {
        // A leading digit is rejected, so the text must not promise it
        assert_eq!(validate_topic_name("9orders"), Err(TopicNameError::Format));
        let message = TopicNameError::Format.to_string();
        assert!(message.starts_with("Name must start with a letter,"));
        assert!(!message.contains("alphanumeric"));
        assert!(TOPIC_NAME_HINT.contains("start with a letter"));
    }

    #[test]
    fn test_goog_prefix_rejected_case_insensitively() {
        assert_eq!(validate_topic_name("google-topic"), Err(TopicNameError::Format));
        assert_eq!(validate_topic_name("GOOGtopic"), Err(TopicNameError::Format));
        assert_eq!(validate_topic_name("gootopic"), Ok(()));
    }

    #[test]
    fn test_prefix() {
        assert_eq!(topic_name_prefix("p1"), "projects/p1/topics/");
    }
}
