// Integration tests for the trending digest orchestrator
// These tests wire the real control API, runner, scheduler and supervisor
// against mock trending and webhook servers

use api::{create_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::config::{PublisherConfig, SchedulerConfig, WebhookUrls};
use common::models::Cadence;
use common::publisher::WebhookPublisher;
use common::runner::{JobRunner, JobTrigger, SpawningTrigger};
use common::schedule::default_rules;
use common::scheduler::SchedulerEngine;
use common::store::ConfigStore;
use common::supervisor::{DependentServiceSupervisor, HttpHealthCheck, ServiceLauncher};
use common::trending::TrendingClient;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestSystem {
    _dir: TempDir,
    store: Arc<ConfigStore>,
    trigger: Arc<dyn JobTrigger>,
}

/// Store seeded with `language`, runner pointed at `server`
fn setup_system(server: &MockServer, language: &str) -> TestSystem {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "language": language,
            "api_url": format!("{}/repositories", server.uri()),
        })
        .to_string(),
    )
    .unwrap();

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
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        Arc::new(TrendingClient::new(5).unwrap()),
        Arc::new(publisher),
        "http://127.0.0.1:9/unused",
    ));

    TestSystem {
        _dir: dir,
        store,
        trigger: Arc::new(SpawningTrigger::new(runner)),
    }
}

fn one_repository() -> serde_json::Value {
    serde_json::json!([{
        "name": "tokio-rs/tokio",
        "url": "https://github.com/tokio-rs/tokio",
        "stars": 25000,
        "currentPeriodStars": 120,
        "language": "Rust"
    }])
}

/// Poll the mock server until `count` requests hit `hook_path`
async fn wait_for_posts(server: &MockServer, hook_path: &str, count: usize) -> usize {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == hook_path)
            .count();
        if seen >= count || tokio::time::Instant::now() >= deadline {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn mount_trending(server: &MockServer, since: &str, language: &str) {
    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("since", since))
        .and(query_param("language", language))
        .respond_with(ResponseTemplate::new(200).set_body_json(one_repository()))
        .mount(server)
        .await;
}

async fn mount_hooks(server: &MockServer) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_set_language_triggers_daily_digest_with_new_language() {
    let server = MockServer::start().await;
    mount_trending(&server, "daily", "rust").await;
    mount_hooks(&server).await;

    let system = setup_system(&server, "python");
    let router = create_router(AppState::new(system.store.clone(), system.trigger.clone()));

    let response = router
        .oneshot(
            Request::post("/set_language")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"language": "rust"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Summary plus one repository message
    assert_eq!(wait_for_posts(&server, "/hooks/daily", 2).await, 2);
    assert_eq!(
        system.store.load().await.unwrap().language.as_deref(),
        Some("rust")
    );
}

#[tokio::test]
async fn test_manual_trigger_uses_requested_language_only_once() {
    let server = MockServer::start().await;
    mount_trending(&server, "monthly", "go").await;
    mount_hooks(&server).await;

    let system = setup_system(&server, "python");
    let router = create_router(AppState::new(system.store.clone(), system.trigger.clone()));

    let response = router
        .oneshot(
            Request::post("/trigger")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"since": "monthly", "language": "go"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert_eq!(wait_for_posts(&server, "/hooks/monthly", 2).await, 2);
    assert_eq!(
        system.store.load().await.unwrap().language.as_deref(),
        Some("python")
    );
}

#[tokio::test]
async fn test_scheduler_tick_runs_weekly_digest_on_sunday() {
    let server = MockServer::start().await;
    mount_trending(&server, "daily", "rust").await;
    mount_trending(&server, "weekly", "rust").await;
    mount_hooks(&server).await;

    let system = setup_system(&server, "rust");
    let config = SchedulerConfig::default();
    let engine = SchedulerEngine::new(config.clone(), system.trigger.clone());

    // 2024-03-10 is a Sunday
    let trigger_at = Utc.with_ymd_and_hms(2024, 3, 10, 19, 0, 0).unwrap();
    engine.arm(default_rules(&config).unwrap(), trigger_at - ChronoDuration::minutes(1));

    let fired = engine.evaluate_at(trigger_at + ChronoDuration::seconds(3));
    assert_eq!(fired, vec![Cadence::Daily, Cadence::Weekly]);

    assert_eq!(wait_for_posts(&server, "/hooks/daily", 2).await, 2);
    assert_eq!(wait_for_posts(&server, "/hooks/weekly", 2).await, 2);
}

#[tokio::test]
async fn test_control_api_serves_over_tcp_and_shuts_down() {
    let server = MockServer::start().await;
    let system = setup_system(&server, "rust");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let serving = tokio::spawn(api::serve(
        listener,
        AppState::new(system.store.clone(), system.trigger.clone()),
        async move {
            let _ = stop_rx.await;
        },
    ));

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/set_language", addr))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No language provided");

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

/// Launcher that must never be used
struct PanickingLauncher;

impl ServiceLauncher for PanickingLauncher {
    fn launch(
        &self,
    ) -> Result<Box<dyn common::supervisor::ManagedProcess>, common::errors::SupervisorError> {
        panic!("service was already running, launch must not be called");
    }

    fn describe(&self) -> String {
        "panicking launcher".to_string()
    }
}

#[tokio::test]
async fn test_running_dependent_service_is_not_launched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repositories"))
        .and(query_param("since", "daily"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let health = HttpHealthCheck::new(&server.uri()).unwrap();
    let supervisor = DependentServiceSupervisor::new(
        Box::new(common::retry::FixedDelay::new(Duration::from_millis(10), 3)),
        Duration::from_secs(1),
        Duration::from_secs(1),
    );

    let handle = supervisor
        .ensure_running(&health, &PanickingLauncher)
        .await
        .unwrap();
    assert!(!handle.is_owned());
    supervisor.shutdown(handle).await.unwrap();
}
