//! Integration tests for the GCP data sources using wiremock
//!
//! These tests run the real HTTP path (request building, token handling,
//! error mapping) against mocked Logging, Error Reporting and Pub/Sub
//! endpoints.

use serde_json::json;
use std::time::{Duration, Instant};
use tglogs::gcp::auth::GcpCredentials;
use tglogs::gcp::client::{Endpoints, GcpClient};
use tglogs::gcp::DataSourceError;
use tglogs::logging::{
    FetchError, ListLogEntriesRequest, LogRetriever, LogSource, LoggingDataSource,
    RetrievalOutcome, SharedSink, SortOrder,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{
    bearer_token, body_partial_json, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "test-project-1";

fn client(server: &MockServer) -> GcpClient {
    GcpClient::with_credentials(
        GcpCredentials::fixed("test-token"),
        PROJECT,
        Endpoints::all(&server.uri()),
    )
    .expect("client")
}

fn text_entry(msg: &str) -> serde_json::Value {
    json!({
        "logName": format!("projects/{}/logs/syslog", PROJECT),
        "timestamp": "2024-03-02T10:00:00Z",
        "severity": "ERROR",
        "insertId": msg,
        "textPayload": msg
    })
}

fn request(filter: Option<&str>, token: Option<&str>) -> ListLogEntriesRequest {
    ListLogEntriesRequest {
        filter: filter.map(str::to_string),
        order: SortOrder::Descending,
        page_size: 100,
        page_token: token.map(str::to_string),
    }
}

mod entries_list {
    use super::*;

    /// The request body carries project, filter, order, size and token
    #[tokio::test]
    async fn test_request_body_and_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .and(bearer_token("test-token"))
            .and(body_partial_json(json!({
                "resourceNames": ["projects/test-project-1"],
                "filter": "severity>=ERROR\n",
                "orderBy": "timestamp desc",
                "pageSize": 100,
                "pageToken": "abc"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [text_entry("disk full")],
                "nextPageToken": "def"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let page = source
            .list_log_entries(
                &request(Some("severity>=ERROR\n"), Some("abc")),
                &CancellationToken::new(),
            )
            .await
            .expect("page");

        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].message(), "disk full");
        assert_eq!(page.next_page_token.as_deref(), Some("def"));
    }

    /// An empty object means no entries and no token
    #[tokio::test]
    async fn test_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let page = source
            .list_log_entries(&request(None, None), &CancellationToken::new())
            .await
            .expect("page");

        assert!(page.entries.is_empty());
        assert!(page.next_page_token.is_none());
    }

    /// Non-success statuses become typed errors with the API message
    #[tokio::test]
    async fn test_403_maps_to_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "The caller does not have permission"}
            })))
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let err = source
            .list_log_entries(&request(None, None), &CancellationToken::new())
            .await
            .expect_err("should fail");

        match err {
            FetchError::DataSource(DataSourceError::Api { status, message }) => {
                assert_eq!(status, 403);
                assert!(message.contains("does not have permission"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// A fixed token cannot be refreshed, so a 401 is returned as is
    #[tokio::test]
    async fn test_401_with_fixed_token_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Request had invalid authentication credentials."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let err = source
            .list_log_entries(&request(None, None), &CancellationToken::new())
            .await
            .expect_err("should fail");

        match err {
            FetchError::DataSource(e) => {
                assert_eq!(e.status(), Some(401));
                assert!(e.user_message().starts_with("Authentication failed"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Cancelling while the server is still answering returns promptly
    #[tokio::test]
    async fn test_cancel_in_flight() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"entries": [text_entry("late")]}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = source.list_log_entries(&request(None, None), &cancel).await;

        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

mod retrieval_over_http {
    use super::*;

    /// The loop adopts each returned token and stops when it disappears
    #[tokio::test]
    async fn test_token_adoption_until_exhausted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .and(body_partial_json(json!({"pageToken": "t2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [text_entry("second")]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [text_entry("first")],
                "nextPageToken": "t2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = SharedSink::new();
        let retriever =
            LogRetriever::with_page_size(LoggingDataSource::new(client(&server)), sink.clone(), 5);

        let outcome = retriever
            .reload(Some("severity>=ERROR\n".into()), SortOrder::Descending)
            .await
            .expect("retrieval");

        assert_eq!(outcome, RetrievalOutcome::Exhausted { fetched: 2 });
        let messages: Vec<String> = sink.lock().entries().iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["first", "second"]);

        let state = retriever.state();
        assert!(!state.is_loading);
        assert!(!state.has_more);
    }

    /// A failure leaves a user message and drops the continuation token
    #[tokio::test]
    async fn test_failure_sets_last_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let retriever =
            LogRetriever::new(LoggingDataSource::new(client(&server)), SharedSink::new());
        let err = retriever
            .reload(None, SortOrder::Descending)
            .await
            .expect_err("should fail");

        assert_eq!(err.status(), Some(429));
        let state = retriever.state();
        assert_eq!(
            state.last_error.as_deref(),
            Some("Rate limit exceeded. Please try again later.")
        );
        assert!(!state.has_more);
        assert!(!state.is_loading);
    }

    /// A rejected filter reports the server's explanation
    #[tokio::test]
    async fn test_invalid_filter_message_reaches_user() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "Unparseable filter: syntax error at line 1, column 14",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let retriever =
            LogRetriever::new(LoggingDataSource::new(client(&server)), SharedSink::new());
        let err = retriever
            .reload(Some("severity>=(".to_string()), SortOrder::Descending)
            .await
            .expect_err("should fail");

        assert_eq!(err.status(), Some(400));
        assert_eq!(
            retriever.state().last_error.as_deref(),
            Some("Invalid request: Unparseable filter: syntax error at line 1, column 14")
        );
    }
}

mod catalogue {
    use super::*;

    #[tokio::test]
    async fn test_log_ids_follow_pages_and_decode() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/projects/test-project-1/logs"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logNames": ["projects/test-project-1/logs/cloudaudit.googleapis.com%2Factivity"]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/projects/test-project-1/logs"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logNames": ["projects/test-project-1/logs/syslog"],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let ids = source.list_log_ids().await.expect("log ids");
        assert_eq!(ids, vec!["syslog", "cloudaudit.googleapis.com/activity"]);
    }

    #[tokio::test]
    async fn test_resource_descriptors() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/monitoredResourceDescriptors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceDescriptors": [
                    {"type": "k8s_container", "displayName": "Kubernetes Container"},
                    {"type": "gce_instance", "displayName": "VM Instance"}
                ]
            })))
            .mount(&server)
            .await;

        let source = LoggingDataSource::new(client(&server));
        let descriptors = source.list_resource_descriptors().await.expect("descriptors");
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[1].resource_type, "gce_instance");
        assert_eq!(descriptors[1].label(), "VM Instance");
    }
}

mod viewer {
    use super::*;
    use tglogs::app::App;
    use tglogs::config::Config;

    async fn mount_catalogue(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v2/monitoredResourceDescriptors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceDescriptors": [{"type": "gce_instance", "displayName": "VM Instance"}]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/projects/test-project-1/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logNames": ["projects/test-project-1/logs/syslog"]
            })))
            .mount(server)
            .await;
    }

    async fn settle(app: &mut App) {
        while app.is_loading() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        app.tick().await;
    }

    /// Editing the quick search stops "next page" from extending the old query
    #[tokio::test]
    async fn test_search_edit_drops_next_page() {
        let server = MockServer::start().await;
        mount_catalogue(&server).await;

        let page: Vec<_> = (0..100).map(|i| text_entry(&format!("line {i}"))).collect();
        Mock::given(method("POST"))
            .and(path("/v2/entries:list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": page,
                "nextPageToken": "more"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut app = App::new(LoggingDataSource::new(client(&server)), Config::default());
        app.reload().await;
        settle(&mut app).await;
        assert_eq!(app.visible.len(), 100);
        assert!(app.retrieval_state().has_more);

        app.search_text = "line 1".to_string();
        app.apply_search();
        assert!(!app.retrieval_state().has_more);

        // No second request goes out
        app.load_next_page();
        settle(&mut app).await;
    }
}

mod error_reporting_api {
    use super::*;
    use tglogs::error_reporting::{list_group_stats, TimePeriod};

    #[tokio::test]
    async fn test_group_stats_period_and_parse() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta1/projects/test-project-1/groupStats"))
            .and(query_param("timeRange.period", "PERIOD_1_WEEK"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errorGroupStats": [{
                    "group": {"name": "projects/test-project-1/groups/g1", "groupId": "g1"},
                    "count": "42",
                    "affectedUsersCount": "7",
                    "lastSeenTime": "2024-03-02T10:00:00Z",
                    "representative": {
                        "serviceContext": {"service": "api"},
                        "message": "TypeError: x is undefined\n    at handler"
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stats = list_group_stats(&client(&server), TimePeriod::OneWeek)
            .await
            .expect("stats");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].count, 42);
        assert_eq!(stats[0].representative.service_context.service, "api");
        assert_eq!(stats[0].summary(), "TypeError: x is undefined");
    }

    #[tokio::test]
    async fn test_no_groups() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta1/projects/test-project-1/groupStats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let stats = list_group_stats(&client(&server), TimePeriod::OneDay)
            .await
            .expect("stats");
        assert!(stats.is_empty());
    }
}

mod pubsub_api {
    use super::*;
    use tglogs::pubsub::{create_topic, list_topics, PubSubError, TopicNameError};

    #[tokio::test]
    async fn test_create_topic_puts_full_name() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/projects/test-project-1/topics/orders"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project-1/topics/orders"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let name = create_topic(&client(&server), "orders").await.expect("created");
        assert_eq!(name, "projects/test-project-1/topics/orders");
    }

    /// Invalid names never reach the server
    #[tokio::test]
    async fn test_invalid_name_not_sent() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = create_topic(&client(&server), "goog-topic").await.expect_err("invalid");
        assert!(matches!(err, PubSubError::InvalidName(TopicNameError::Format)));
    }

    #[tokio::test]
    async fn test_existing_topic_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/projects/test-project-1/topics/orders"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": 409, "message": "Resource already exists in the project"}
            })))
            .mount(&server)
            .await;

        let err = create_topic(&client(&server), "orders").await.expect_err("conflict");
        match err {
            PubSubError::DataSource(e) => assert_eq!(e.status(), Some(409)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_topics_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/projects/test-project-1/topics"))
            .and(query_param("pageToken", "n"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "topics": [{"name": "projects/test-project-1/topics/b"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/projects/test-project-1/topics"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "topics": [{"name": "projects/test-project-1/topics/a"}],
                "nextPageToken": "n"
            })))
            .mount(&server)
            .await;

        let topics = list_topics(&client(&server)).await.expect("topics");
        assert_eq!(
            topics,
            vec![
                "projects/test-project-1/topics/a",
                "projects/test-project-1/topics/b"
            ]
        );
    }
}
