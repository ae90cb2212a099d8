// Error handling framework

use std::path::PathBuf;
use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid cadence: {0}")]
    InvalidCadence(String),
}

/// Configuration store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration unavailable at {}: {reason}", path.display())]
    ConfigUnavailable { path: PathBuf, reason: String },

    #[error("Configuration key '{0}' is read-only")]
    ReadOnlyKey(String),
}

impl StoreError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::ConfigUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Dependent service supervision errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to launch dependent service '{command}': {reason}")]
    LaunchFailed { command: String, reason: String },

    #[error("Dependent service not ready after {attempts} probes ({elapsed_ms} ms)")]
    DependencyUnready { attempts: u32, elapsed_ms: u128 },

    #[error("Failed to terminate dependent service: {0}")]
    TerminateFailed(String),

    #[error("Shutdown requested while waiting for the dependent service")]
    Interrupted,
}

/// Job execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(#[from] StoreError),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Malformed trending response: {0}")]
    MalformedResponse(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("No webhook configured for {0} digests")]
    WebhookNotConfigured(String),

    #[error("HTTP client initialization failed: {0}")]
    ClientInit(String),
}

impl ExecutionError {
    /// Short label used for the failure reason in metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ExecutionError::ConfigUnavailable(_) => "config_unavailable",
            ExecutionError::FetchFailed(_) | ExecutionError::MalformedResponse(_) => "fetch",
            ExecutionError::PublishFailed(_) | ExecutionError::WebhookNotConfigured(_) => {
                "publish"
            }
            ExecutionError::ClientInit(_) => "client_init",
        }
    }
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}
