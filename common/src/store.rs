// Runtime configuration store backed by a flat JSON file
//
// Readers never take the write lock: `save` writes a sibling temp file and
// renames it over the target, so a concurrent `load` sees either the old or
// the new file, never a partial one.

use crate::errors::StoreError;
use crate::models::{normalize_language, Cadence};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub const LANGUAGE_KEY: &str = "language";
pub const API_URL_KEY: &str = "api_url";
pub const WEBHOOK_KEY_PREFIX: &str = "DISCORD_WEBHOOK_URL_FOR_";

/// Persisted runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Language filter; `None` or empty means all languages
    #[serde(default)]
    pub language: Option<String>,

    /// Base endpoint of the trending service
    #[serde(default, alias = "API_URL", skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Keys the core does not interpret (webhook URLs, bot token, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Configuration {
    /// Language filter with blanks folded to `None`
    pub fn language_or_none(&self) -> Option<String> {
        normalize_language(self.language.as_deref())
    }

    /// Webhook stored under `DISCORD_WEBHOOK_URL_FOR_<cadence>`, if non-blank
    pub fn webhook_for(&self, cadence: Cadence) -> Option<&str> {
        self.extra
            .get(&format!("{}{}", WEBHOOK_KEY_PREFIX, cadence.as_str()))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Apply a single key update
    ///
    /// The language value is stored trimmed; other keys are stored verbatim.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        match key {
            LANGUAGE_KEY => {
                self.language = Some(value.trim().to_string());
            }
            API_URL_KEY | "API_URL" => return Err(StoreError::ReadOnlyKey(key.to_string())),
            other => {
                self.extra
                    .insert(other.to_string(), Value::String(value.to_string()));
            }
        }
        Ok(())
    }
}

/// Process-wide configuration store
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the configuration file
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Configuration, StoreError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::unavailable(&self.path, e))?;

        let config: Configuration = serde_json::from_str(&raw)
            .map_err(|e| StoreError::unavailable(&self.path, format!("invalid JSON: {}", e)))?;

        debug!(language = ?config.language, "Configuration loaded");
        Ok(config)
    }

    /// Replace the persisted configuration
    pub async fn save(&self, config: &Configuration) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_atomically(config).await
    }

    /// Load, set one key and save, serialized against other writers
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn update(&self, key: &str, value: &str) -> Result<Configuration, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut config = self.load().await?;
        config.set(key, value)?;
        self.write_atomically(&config).await?;

        info!(key = key, value = value, "Configuration updated");
        Ok(config)
    }

    async fn write_atomically(&self, config: &Configuration) -> Result<(), StoreError> {
        let json = to_pretty_json(config)
            .map_err(|e| StoreError::unavailable(&self.path, format!("serialize: {}", e)))?;

        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| StoreError::unavailable(&tmp_path, e))?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::unavailable(&self.path, e));
        }

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }
}

// Four-space indentation, matching hand-edited config files
fn to_pretty_json(config: &Configuration) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config.serialize(&mut ser)?;
    Ok(buf)
}
