// Fetch-and-publish job runner
//
// Every invocation reads the configuration store afresh, so a language change
// made through the control endpoint applies to the very next run.

use crate::errors::ExecutionError;
use crate::models::{normalize_language, Cadence, JobInvocation, JobReport};
use crate::publisher::{repository_message, summary_message, Destination, DigestPublisher};
use crate::store::ConfigStore;
use crate::telemetry;
use crate::trending::TrendingSource;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};

/// Fire-and-forget entry point shared by the scheduler and the control API
pub trait JobTrigger: Send + Sync {
    /// Start a run on its own task; never waits for it
    fn trigger(&self, cadence: Cadence);

    /// Start a run with an explicit language instead of the stored one
    fn trigger_with(&self, cadence: Cadence, language: Option<String>);
}

pub struct JobRunner {
    store: Arc<ConfigStore>,
    source: Arc<dyn TrendingSource>,
    publisher: Arc<dyn DigestPublisher>,
    default_api_url: String,
}

impl JobRunner {
    pub fn new(
        store: Arc<ConfigStore>,
        source: Arc<dyn TrendingSource>,
        publisher: Arc<dyn DigestPublisher>,
        default_api_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            publisher,
            default_api_url: default_api_url.into(),
        }
    }

    /// Run once with the language currently stored in the configuration
    pub async fn run(&self, cadence: Cadence) -> Result<JobReport, ExecutionError> {
        self.execute(cadence, None).await
    }

    /// Run once with an explicit language filter (`None` = all languages)
    pub async fn run_with(
        &self,
        cadence: Cadence,
        language: Option<String>,
    ) -> Result<JobReport, ExecutionError> {
        self.execute(cadence, Some(normalize_language(language.as_deref())))
            .await
    }

    async fn execute(
        &self,
        cadence: Cadence,
        language_override: Option<Option<String>>,
    ) -> Result<JobReport, ExecutionError> {
        let config = self.store.load().await?;
        let language = language_override.unwrap_or_else(|| config.language_or_none());
        let api_url = config
            .api_url
            .clone()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.default_api_url.clone());

        let stored_webhook = config.webhook_for(cadence).map(str::to_string);

        let invocation = JobInvocation::new(cadence, language);
        let span = info_span!(
            "job",
            invocation_id = %invocation.id,
            cadence = %cadence,
            language = invocation.language_label()
        );

        async move {
            info!(started_at = %invocation.started_at, "Running trending digest");

            let destination =
                Destination::new(cadence).with_stored_webhook(stored_webhook.as_deref());
            let result = self
                .fetch_and_publish(&invocation, &api_url, destination)
                .await;

            let elapsed = (chrono::Utc::now() - invocation.started_at)
                .to_std()
                .unwrap_or_default()
                .as_secs_f64();
            telemetry::record_job_duration(cadence, elapsed);

            match &result {
                Ok(report) => {
                    telemetry::record_job_success(cadence);
                    info!(
                        repositories = report.repositories,
                        published = report.published,
                        failed = report.failed,
                        "Trending digest finished"
                    );
                }
                Err(e) => {
                    telemetry::record_job_failure(cadence, e.reason());
                    error!(error = %e, "Trending digest failed");
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_publish(
        &self,
        invocation: &JobInvocation,
        api_url: &str,
        destination: Destination<'_>,
    ) -> Result<JobReport, ExecutionError> {
        let cadence = invocation.cadence;
        let repositories = self
            .source
            .fetch(api_url, invocation.language.as_deref(), cadence)
            .await?;

        let mut report = JobReport {
            repositories: repositories.len(),
            ..JobReport::default()
        };

        if repositories.is_empty() {
            info!("No repositories found, nothing to publish");
            return Ok(report);
        }

        let color = self.publisher.color();
        let summary = summary_message(
            repositories.len(),
            cadence,
            invocation.started_at.date_naive(),
            color,
        );
        self.publisher.publish(destination, &summary).await?;
        report.published += 1;

        for repo in &repositories {
            let message = repository_message(repo, cadence, color);
            match self.publisher.publish(destination, &message).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(repository = %repo.name, error = %e, "Failed to publish repository");
                }
            }
        }

        telemetry::record_messages_published(cadence, report.published);
        Ok(report)
    }
}

/// Trigger that runs each invocation on its own tracked task
///
/// Spawned runs are never cancelled by shutdown; `drain` resolves once every
/// in-flight invocation has finished.
#[derive(Clone)]
pub struct SpawningTrigger {
    runner: Arc<JobRunner>,
    tracker: TaskTracker,
}

impl SpawningTrigger {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            tracker: TaskTracker::new(),
        }
    }

    /// Run on a separate task; errors are logged inside the invocation
    fn spawn(&self, cadence: Cadence, language: Option<Option<String>>) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        self.tracker.spawn(async move {
            let _ = match language {
                Some(language) => runner.run_with(cadence, language).await,
                None => runner.run(cadence).await,
            };
        })
    }

    /// Number of invocations still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every spawned invocation to finish
    pub async fn drain(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(in_flight = self.tracker.len(), "Waiting for running digests to finish");
        }
        self.tracker.wait().await;
    }
}

impl JobTrigger for SpawningTrigger {
    fn trigger(&self, cadence: Cadence) {
        drop(self.spawn(cadence, None));
    }

    fn trigger_with(&self, cadence: Cadence, language: Option<String>) {
        drop(self.spawn(cadence, Some(language)));
    }
}
