// Process settings with layered configuration (file, env)

use crate::errors::ValidationError;
use crate::models::Cadence;
use crate::schedule::parse_cron_expression;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub trending: TrendingConfig,
    pub publisher: PublisherConfig,
    pub dependent_service: DependentServiceConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Runtime configuration file holding `language` and `api_url`
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendingConfig {
    /// Used when the runtime configuration file has no `api_url`
    pub default_api_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookUrls {
    pub daily: Option<String>,
    pub weekly: Option<String>,
    pub monthly: Option<String>,
}

impl WebhookUrls {
    pub fn for_cadence(&self, cadence: Cadence) -> Option<&str> {
        match cadence {
            Cadence::Daily => self.daily.as_deref(),
            Cadence::Weekly => self.weekly.as_deref(),
            Cadence::Monthly => self.monthly.as_deref(),
        }
        .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub webhooks: WebhookUrls,
    pub timeout_seconds: u64,
    pub embed_color: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependentServiceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub command: String,
    pub working_dir: PathBuf,
    pub probe_timeout_seconds: u64,
    pub probe_max_attempts: u32,
    pub probe_base_delay_ms: u64,
    pub terminate_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    /// Six/seven field cron expression, evaluated in UTC
    pub daily_cron: String,
    pub weekly_cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be greater than 0"));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(ValidationError::MissingField("store.path".to_string()));
        }

        if self.trending.default_api_url.is_empty() {
            return Err(ValidationError::MissingField(
                "trending.default_api_url".to_string(),
            ));
        }

        if self.scheduler.tick_seconds == 0 {
            return Err(invalid("scheduler.tick_seconds", "must be greater than 0"));
        }
        // A coarser tick than the trigger window could skip a firing
        if self.scheduler.tick_seconds > 60 {
            return Err(invalid("scheduler.tick_seconds", "must be at most 60"));
        }

        for (field, expression) in [
            ("scheduler.daily_cron", &self.scheduler.daily_cron),
            ("scheduler.weekly_cron", &self.scheduler.weekly_cron),
        ] {
            parse_cron_expression(expression).map_err(|e| invalid(field, e))?;
        }

        if self.dependent_service.enabled {
            if self.dependent_service.command.trim().is_empty() {
                return Err(ValidationError::MissingField(
                    "dependent_service.command".to_string(),
                ));
            }
            if self.dependent_service.probe_max_attempts == 0 {
                return Err(invalid(
                    "dependent_service.probe_max_attempts",
                    "must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl ToString) -> ValidationError {
    ValidationError::InvalidFieldValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5010,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config.json"),
        }
    }
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            default_api_url: "http://localhost:5011/repositories".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            webhooks: WebhookUrls::default(),
            timeout_seconds: 10,
            embed_color: 0x5865F2,
        }
    }
}

impl Default for DependentServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8888".to_string(),
            command: "npm start".to_string(),
            working_dir: PathBuf::from("API/github-trending-api"),
            probe_timeout_seconds: 10,
            probe_max_attempts: 8,
            probe_base_delay_ms: 250,
            terminate_grace_seconds: 5,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        // 19:00 UTC is 20:00 in the reference deployment (UTC+1, no DST handling)
        Self {
            tick_seconds: 60,
            daily_cron: "0 0 19 * * *".to_string(),
            weekly_cron: "0 0 19 * * Sun".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_coarse_tick() {
        let mut settings = Settings::default();
        settings.scheduler.tick_seconds = 300;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_bad_cron() {
        let mut settings = Settings::default();
        settings.scheduler.weekly_cron = "every sunday".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("scheduler.weekly_cron"));
    }

    #[test]
    fn test_disabled_dependent_service_skips_command_check() {
        let mut settings = Settings::default();
        settings.dependent_service.enabled = false;
        settings.dependent_service.command = String::new();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_webhook_for_cadence_ignores_empty() {
        let urls = WebhookUrls {
            daily: Some("https://hook/daily".into()),
            weekly: Some(String::new()),
            monthly: None,
        };
        assert_eq!(urls.for_cadence(Cadence::Daily), Some("https://hook/daily"));
        assert_eq!(urls.for_cadence(Cadence::Weekly), None);
        assert_eq!(urls.for_cadence(Cadence::Monthly), None);
    }

    #[test]
    fn test_load_from_path_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.server.port, 5010);
        assert_eq!(settings.scheduler.tick_seconds, 60);
    }

    #[test]
    fn test_load_from_path_reads_default_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[server]\nhost = \"0.0.0.0\"\nport = 6000\n\n[publisher.webhooks]\ndaily = \"https://hook/d\"\n",
        )
        .unwrap();
        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.server.port, 6000);
        assert_eq!(
            settings.publisher.webhooks.for_cadence(Cadence::Daily),
            Some("https://hook/d")
        );
    }
}
