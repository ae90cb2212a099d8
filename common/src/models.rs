// Domain models shared by the scheduler, the job runner and the control API

use crate::errors::ScheduleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Trending window a job run corresponds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    /// Value sent as the `since` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }

    /// Capitalized label used in digest titles ("Daily", "Weekly", ...)
    pub fn title(&self) -> &'static str {
        match self {
            Cadence::Daily => "Daily",
            Cadence::Weekly => "Weekly",
            Cadence::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            other => Err(ScheduleError::InvalidCadence(other.to_string())),
        }
    }
}

/// Trending repository record returned by the trending service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub stars: u64,
    pub current_period_stars: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// One execution of the fetch-then-publish workflow
#[derive(Debug, Clone)]
pub struct JobInvocation {
    pub id: Uuid,
    pub cadence: Cadence,
    pub language: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl JobInvocation {
    pub fn new(cadence: Cadence, language: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cadence,
            language,
            started_at: Utc::now(),
        }
    }

    /// Human label for the language filter
    pub fn language_label(&self) -> &str {
        self.language.as_deref().unwrap_or("all languages")
    }
}

/// Outcome of a completed job invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub repositories: usize,
    pub published: usize,
    pub failed: usize,
}

/// Normalize an optional language filter: blank means "all languages"
pub fn normalize_language(language: Option<&str>) -> Option<String> {
    language
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_from_str_is_case_insensitive() {
        assert_eq!("Weekly".parse::<Cadence>().unwrap(), Cadence::Weekly);
        assert_eq!(" monthly ".parse::<Cadence>().unwrap(), Cadence::Monthly);
        assert!("yearly".parse::<Cadence>().is_err());
    }

    #[test]
    fn test_cadence_serializes_lowercase() {
        let json = serde_json::to_string(&Cadence::Daily).unwrap();
        assert_eq!(json, "\"daily\"");
    }

    #[test]
    fn test_repository_deserializes_minimal_record() {
        let repo: Repository = serde_json::from_value(serde_json::json!({
            "name": "tokio",
            "url": "https://github.com/tokio-rs/tokio",
            "stars": 25000,
            "currentPeriodStars": 120
        }))
        .unwrap();
        assert_eq!(repo.current_period_stars, 120);
        assert!(repo.description.is_none());
        assert!(repo.author.is_none());
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language(Some("rust")), Some("rust".to_string()));
        assert_eq!(normalize_language(Some("  ")), None);
        assert_eq!(normalize_language(None), None);
    }

    #[test]
    fn test_invocation_language_label() {
        let inv = JobInvocation::new(Cadence::Daily, None);
        assert_eq!(inv.language_label(), "all languages");
        let inv = JobInvocation::new(Cadence::Daily, Some("go".into()));
        assert_eq!(inv.language_label(), "go");
    }
}
