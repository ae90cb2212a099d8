// Digest publishing to a Discord-style webhook

use crate::config::{PublisherConfig, WebhookUrls};
use crate::errors::ExecutionError;
use crate::models::{Cadence, Repository};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Webhook message body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Digest header announcing how many repositories follow
pub fn summary_message(count: usize, cadence: Cadence, date: NaiveDate, color: u32) -> WebhookMessage {
    WebhookMessage {
        embeds: vec![Embed {
            title: format!(
                "📅 GitHub Trending ({}) - {}",
                cadence.title(),
                date.format("%d/%m/%Y")
            ),
            url: None,
            description: format!("🔍 **{} repositories detected!**", count),
            color,
            fields: Vec::new(),
            author: None,
            footer: EmbedFooter {
                text: "Data fetched from GitHub Trending".to_string(),
            },
        }],
    }
}

/// One message per trending repository
pub fn repository_message(repo: &Repository, cadence: Cadence, color: u32) -> WebhookMessage {
    let language = repo
        .language
        .as_deref()
        .filter(|l| !l.is_empty())
        .unwrap_or("Not specified");

    let author = repo.author.as_ref().map(|name| EmbedAuthor {
        name: name.clone(),
        icon_url: repo.avatar.clone(),
    });

    WebhookMessage {
        embeds: vec![Embed {
            title: repo.name.clone(),
            url: Some(repo.url.clone()),
            description: repo
                .description
                .clone()
                .unwrap_or_else(|| "No description".to_string()),
            color,
            fields: vec![
                EmbedField {
                    name: "🌟 Stars".to_string(),
                    value: repo.stars.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: format!("📈 {} Stars", cadence.title()),
                    value: repo.current_period_stars.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "📝 Language".to_string(),
                    value: language.to_string(),
                    inline: true,
                },
            ],
            author,
            footer: EmbedFooter {
                text: "Trending repository on GitHub".to_string(),
            },
        }],
    }
}

/// Where one invocation's messages go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination<'a> {
    pub cadence: Cadence,
    /// Webhook read from the runtime configuration file; used only when the
    /// settings name none for this cadence
    pub stored_webhook: Option<&'a str>,
}

impl<'a> Destination<'a> {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            stored_webhook: None,
        }
    }

    pub fn with_stored_webhook(mut self, url: Option<&'a str>) -> Self {
        self.stored_webhook = url;
        self
    }
}

/// Downstream messaging endpoint
#[async_trait]
pub trait DigestPublisher: Send + Sync {
    async fn publish(
        &self,
        destination: Destination<'_>,
        message: &WebhookMessage,
    ) -> Result<(), ExecutionError>;

    /// Embed color for messages built for this publisher
    fn color(&self) -> u32 {
        0x5865F2
    }
}

/// Posts messages to the webhook configured for each cadence
pub struct WebhookPublisher {
    client: Client,
    webhooks: WebhookUrls,
    color: u32,
}

impl WebhookPublisher {
    pub fn new(config: &PublisherConfig) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                ExecutionError::ClientInit(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            webhooks: config.webhooks.clone(),
            color: config.embed_color,
        })
    }
}

#[async_trait]
impl DigestPublisher for WebhookPublisher {
    #[instrument(skip(self, destination, message), fields(cadence = %destination.cadence))]
    async fn publish(
        &self,
        destination: Destination<'_>,
        message: &WebhookMessage,
    ) -> Result<(), ExecutionError> {
        let cadence = destination.cadence;
        let url = self
            .webhooks
            .for_cadence(cadence)
            .or_else(|| destination.stored_webhook.filter(|url| !url.is_empty()))
            .ok_or_else(|| ExecutionError::WebhookNotConfigured(cadence.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| ExecutionError::PublishFailed(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::PublishFailed(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        debug!(status = %status, "Webhook message delivered");
        Ok(())
    }

    fn color(&self) -> u32 {
        self.color
    }
}
