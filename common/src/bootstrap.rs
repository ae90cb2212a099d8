// Bootstrap utilities for binary initialization
// Shared by the orchestrator's serve and run-once paths

use crate::config::Settings;
use crate::publisher::WebhookPublisher;
use crate::runner::JobRunner;
use crate::store::ConfigStore;
use crate::supervisor::{
    CommandLauncher, DependentServiceSupervisor, HttpHealthCheck, ServiceHandle,
};
use crate::trending::TrendingClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Open the configuration store and make sure it is readable
///
/// # Errors
/// Returns error if the file is missing or not valid JSON
#[tracing::instrument(skip(settings))]
pub async fn init_config_store(settings: &Settings) -> Result<Arc<ConfigStore>> {
    let store = ConfigStore::new(&settings.store.path);

    let config = store
        .load()
        .await
        .context("Failed to load configuration store")?;

    info!(
        path = %store.path().display(),
        language = config.language.as_deref().unwrap_or(""),
        "Configuration store loaded"
    );
    Ok(Arc::new(store))
}

/// Build the job runner with HTTP trending client and webhook publisher
///
/// # Errors
/// Returns error if an HTTP client cannot be created
pub fn init_job_runner(settings: &Settings, store: Arc<ConfigStore>) -> Result<Arc<JobRunner>> {
    let source = TrendingClient::new(settings.trending.timeout_seconds)
        .context("Failed to create trending client")?;
    let publisher =
        WebhookPublisher::new(&settings.publisher).context("Failed to create webhook publisher")?;

    Ok(Arc::new(JobRunner::new(
        store,
        Arc::new(source),
        Arc::new(publisher),
        settings.trending.default_api_url.clone(),
    )))
}

/// Ensure the dependent service is up, launching it when needed
///
/// A launch failure is logged and treated as an external service so the
/// orchestrator keeps running; individual jobs then fail at fetch time.
#[tracing::instrument(skip(settings, supervisor))]
pub async fn init_dependent_service(
    settings: &Settings,
    supervisor: &DependentServiceSupervisor,
) -> ServiceHandle {
    let config = &settings.dependent_service;
    if !config.enabled {
        info!("Dependent service supervision disabled");
        return ServiceHandle::External;
    }

    let health = match HttpHealthCheck::new(&config.base_url) {
        Ok(health) => health,
        Err(e) => {
            warn!(error = %e, "Cannot build health check, skipping supervision");
            return ServiceHandle::External;
        }
    };
    let launcher = CommandLauncher::from_config(config);

    match supervisor.ensure_running(&health, &launcher).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "Failed to start dependent service");
            ServiceHandle::External
        }
    }
}
