// Telemetry module for structured logging and metrics

use crate::config::LogFormat;
use crate::models::Cadence;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over the configured level. JSON output
/// carries the current span (job invocation id, cadence, language) on every
/// line.
pub fn init_logging(log_level: &str, format: &LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, format = ?format, "Logging initialized");
    Ok(())
}

/// Initialize Prometheus metrics exporter and describe all metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "digest_job_success_total",
        "Total number of successful digest job runs"
    );
    describe_counter!(
        "digest_job_failed_total",
        "Total number of failed digest job runs"
    );
    describe_counter!(
        "digest_messages_published_total",
        "Total number of webhook messages delivered"
    );
    describe_histogram!(
        "digest_job_duration_seconds",
        "Duration of digest job runs in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_job_success(cadence: Cadence) {
    counter!("digest_job_success_total", "cadence" => cadence.as_str()).increment(1);
}

#[inline]
pub fn record_job_failure(cadence: Cadence, reason: &'static str) {
    counter!(
        "digest_job_failed_total",
        "cadence" => cadence.as_str(),
        "reason" => reason
    )
    .increment(1);
}

#[inline]
pub fn record_job_duration(cadence: Cadence, duration_seconds: f64) {
    histogram!("digest_job_duration_seconds", "cadence" => cadence.as_str())
        .record(duration_seconds);
}

#[inline]
pub fn record_messages_published(cadence: Cadence, count: usize) {
    counter!("digest_messages_published_total", "cadence" => cadence.as_str())
        .increment(count as u64);
}
