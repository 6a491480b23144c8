//! Runtime settings for the adaptive loop and the judges.
//!
//! Loaded from the optional `runtime:` block of a request file. Every field
//! has a default, so an absent block is a valid configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

use scanwright_core::{ConfigError, JudgeVariant, DEFAULT_FALLBACK_CONFIGURATION, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Settings shared by every target processed in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Retry probes allowed after the initial probe
    pub max_attempts: u32,

    /// Static configuration used when no usable suggestion exists
    pub fallback_configuration: String,

    /// Upper bound for one judge call, transport retries included
    #[serde(with = "duration_human")]
    pub judge_timeout: Duration,

    /// Extra attempts for transient transport failures
    pub transport_retries: usize,

    /// First backoff delay between transport retries
    #[serde(with = "duration_human")]
    pub transport_backoff: Duration,

    /// Targets processed in parallel
    pub concurrency: usize,

    /// Per-variant endpoint overrides
    pub base_urls: BaseUrls,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fallback_configuration: DEFAULT_FALLBACK_CONFIGURATION.to_string(),
            judge_timeout: Duration::from_secs(60),
            transport_retries: 2,
            transport_backoff: Duration::from_millis(500),
            concurrency: 4,
            base_urls: BaseUrls::default(),
        }
    }
}

impl RuntimeConfig {
    /// Decode the `runtime` block of a request. `None` yields the defaults.
    pub fn from_value(value: Option<&JsonValue>) -> Result<Self, ConfigError> {
        let config = match value {
            Some(JsonValue::Null) | None => Self::default(),
            Some(v) => serde_json::from_value(v.clone())?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_fallback_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.fallback_configuration = configuration.into();
        self
    }

    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Check values serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback_configuration.trim().is_empty() {
            return Err(ConfigError::InvalidRequest(
                "runtime.fallback_configuration must not be blank".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidRequest(
                "runtime.concurrency must be at least 1".to_string(),
            ));
        }
        if self.judge_timeout.is_zero() {
            return Err(ConfigError::InvalidRequest(
                "runtime.judge_timeout must be positive".to_string(),
            ));
        }
        self.base_urls.validate()
    }
}

/// Endpoint overrides, mostly for self-hosted gateways and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseUrls {
    #[serde(skip_serializing_if = "Option::is_none", alias = "openai")]
    pub gpt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama: Option<String>,
}

impl BaseUrls {
    /// Endpoint for a variant, without a trailing slash.
    pub fn for_variant(&self, variant: JudgeVariant) -> String {
        let url = match variant {
            JudgeVariant::Gpt => self.gpt.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL),
            JudgeVariant::Gemini => self.gemini.as_deref().unwrap_or(DEFAULT_GEMINI_BASE_URL),
            JudgeVariant::Ollama => self.ollama.as_deref().unwrap_or(DEFAULT_OLLAMA_BASE_URL),
        };
        url.trim_end_matches('/').to_string()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for url in [&self.gpt, &self.gemini, &self.ollama].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidRequest(format!(
                    "base_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }
}

/// Durations as human-readable strings ("60s", "1m 30s", "250ms").
mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
