// End-to-end job runner tests against mock trending and webhook servers

use common::config::{PublisherConfig, WebhookUrls};
use common::errors::ExecutionError;
use common::models::Cadence;
use common::publisher::WebhookPublisher;
use common::runner::JobRunner;
use common::store::ConfigStore;
use common::trending::TrendingClient;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn trending_body(count: usize) -> serde_json::Value {
    let repos: Vec<_> = (0..count)
        .map(|i| {
            serde_json::json!({
                "name": format!("owner/repo-{}", i),
                "url": format!("https://github.com/owner/repo-{}", i),
                "stars": 1000 + i,
                "currentPeriodStars": 10 + i,
                "language": "Rust"
            })
        })
        .collect();
    serde_json::Value::Array(repos)
}

struct Harness {
    _dir: TempDir,
    store: Arc<ConfigStore>,
    runner: JobRunner,
}

async fn harness(server: &MockServer, language: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = serde_json::json!({
        "api_url": format!("{}/repositories", server.uri()),
    });
    if let Some(language) = language {
        config["language"] = serde_json::Value::String(language.to_string());
    }
    std::fs::write(&path, config.to_string()).unwrap();

    let store = Arc::new(ConfigStore::new(path));
    let publisher = WebhookPublisher::new(&PublisherConfig {
        webhooks: WebhookUrls {
            daily: Some(format!("{}/hooks/daily", server.uri())),
            weekly: Some(format!("{}/hooks/weekly", server.uri())),
            monthly: Some(format!("{}/hooks/monthly", server.uri())),
        },
        ..PublisherConfig::default()
    })
    .unwrap();

    let runner = JobRunner::new(
        store.clone(),
        Arc::new(TrendingClient::new(5).unwrap()),
        Arc::new(publisher),
        "http://127.0.0.1:9/unused",
    );

    Harness {
        _dir: dir,
        store,
        runner,
    }
}

#[tokio::test]
async fn test_run_queries_stored_language_and_cadence() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("since", "weekly"))
        .and(query_param("language", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(2)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hooks/weekly"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server, Some("rust")).await;
    let report = h.runner.run(Cadence::Weekly).await.unwrap();

    assert_eq!(report.repositories, 2);
    assert_eq!(report.published, 3);
    assert_eq!(report.failed, 0);
    server.verify().await;
}

#[tokio::test]
async fn test_webhook_from_config_file_when_settings_have_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(1)))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/stored/daily"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let config = serde_json::json!({
        "language": "",
        "api_url": format!("{}/repositories", server.uri()),
        "DISCORD_WEBHOOK_URL_FOR_daily": format!("{}/stored/daily", server.uri()),
    });
    std::fs::write(&config_path, config.to_string()).unwrap();

    let runner = JobRunner::new(
        Arc::new(ConfigStore::new(config_path)),
        Arc::new(TrendingClient::new(5).unwrap()),
        Arc::new(WebhookPublisher::new(&PublisherConfig::default()).unwrap()),
        "http://127.0.0.1:9/unused",
    );

    let report = runner.run(Cadence::Daily).await.unwrap();
    assert_eq!(report.published, 2);

    // No weekly key in either place
    let err = runner.run(Cadence::Weekly).await.unwrap_err();
    assert!(matches!(err, ExecutionError::WebhookNotConfigured(_)));
    server.verify().await;
}

#[tokio::test]
async fn test_empty_language_omits_query_parameter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("since", "daily"))
        .and(query_param_is_missing("language"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(0)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some("")).await;
    let report = h.runner.run(Cadence::Daily).await.unwrap();

    assert_eq!(report.repositories, 0);
    assert_eq!(report.published, 0);
    server.verify().await;
}

#[tokio::test]
async fn test_summary_is_published_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(1)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hooks/monthly"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let h = harness(&server, None).await;
    h.runner.run(Cadence::Monthly).await.unwrap();

    let posts: Vec<serde_json::Value> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/hooks/monthly")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();

    assert_eq!(posts.len(), 2);
    let summary_title = posts[0]["embeds"][0]["title"].as_str().unwrap();
    assert!(summary_title.starts_with("📅 GitHub Trending (Monthly) - "));
    assert_eq!(posts[1]["embeds"][0]["title"], "owner/repo-0");
    assert_eq!(posts[1]["embeds"][0]["fields"][1]["name"], "📈 Monthly Stars");
}

#[tokio::test]
async fn test_fetch_failure_is_contained_and_publishes_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, Some("go")).await;
    let err = h.runner.run(Cadence::Daily).await.unwrap_err();

    assert!(matches!(err, ExecutionError::FetchFailed(_)));
    server.verify().await;
}

#[tokio::test]
async fn test_malformed_response_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let h = harness(&server, None).await;
    let err = h.runner.run(Cadence::Daily).await.unwrap_err();
    assert!(matches!(err, ExecutionError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_rejected_repository_message_is_counted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(3)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hooks/daily"))
        .and(body_string_contains(r#""title":"owner/repo-1""#))
        .respond_with(ResponseTemplate::new(400))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hooks/daily"))
        .respond_with(ResponseTemplate::new(204))
        .with_priority(2)
        .mount(&server)
        .await;

    let h = harness(&server, None).await;
    let report = h.runner.run(Cadence::Daily).await.unwrap();

    assert_eq!(report.repositories, 3);
    assert_eq!(report.published, 3);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_language_change_applies_to_next_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("language", "python"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(0)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("language", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(0)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some("python")).await;
    h.runner.run(Cadence::Daily).await.unwrap();
    h.store.update("language", "rust").await.unwrap();
    h.runner.run(Cadence::Daily).await.unwrap();

    server.verify().await;
}

/// *For any* cadence and language, the fetch carries exactly those parameters
#[test]
fn property_fetch_parameters_match_invocation() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    proptest!(ProptestConfig::with_cases(16), |(
        cadence in prop_oneof![Just(Cadence::Daily), Just(Cadence::Weekly), Just(Cadence::Monthly)],
        language in "[a-z]{1,10}",
    )| {
        rt.block_on(async {
            let server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/repositories"))
                .and(query_param("since", cadence.as_str()))
                .and(query_param("language", language.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(trending_body(0)))
                .expect(1)
                .mount(&server)
                .await;

            let h = harness(&server, Some(language.as_str())).await;
            h.runner.run(cadence).await.unwrap();
            server.verify().await;
        });
    });
}
