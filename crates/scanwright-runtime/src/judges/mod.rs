//! Judges: interchangeable backends that classify observation sets.
//!
//! Every variant is a [`ModelJudge`] around a provider-specific
//! [`JudgeBackend`]. The judge owns everything the variants share: the
//! configure step, prompt rendering, timeout and transport retries,
//! extraction, usage accounting and artifact persistence. Backends only
//! speak their provider's wire format.
//!
//! ## Contract
//!
//! [`Judge::classify`] never fails. Network errors, timeouts, auth
//! failures, unparsable output and calls made before
//! [`configure`](Judge::configure) all come back as an `error` verdict
//! with a readable cause, and every call leaves an artifact behind.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use scanwright_core::{
    extract, ConfigError, ExtractionError, JudgeConfig, JudgeMode, JudgeVariant, ObservationSet,
    Verdict,
};

use crate::artifacts::{ArtifactLocation, ArtifactSink, VerdictArtifact};
use crate::prompts::JudgePrompt;
use crate::resilience::{with_transport_retries, RetryPolicy, UsageTracker};

mod gemini;
mod ollama;
mod openai;
mod registry;
pub mod secrets;
mod transport;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use registry::JudgeRegistry;
pub use secrets::{ApiCredential, CredentialSource};

/// Failures inside a judge call. Converted to `error` verdicts before
/// they reach the orchestrator.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("judge '{0}' is not configured; call configure() first")]
    NotConfigured(String),

    #[error("judge configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("judge call timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("unusable judge output ({source}): {raw}")]
    Extraction { source: ExtractionError, raw: String },

    #[error("failed to write artifact: {0}")]
    Artifact(String),
}

impl JudgeError {
    /// Transient failures worth another transport attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            JudgeError::Transport(_) | JudgeError::RateLimited { .. } => true,
            JudgeError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Widened so provider-reported counts cannot overflow.
    pub fn total(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

/// Raw text and usage from one provider round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// Client state established by `configure()`.
pub struct Session {
    client: reqwest::Client,
    credential: Option<ApiCredential>,
}

impl Session {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The credential, for variants that need one.
    pub fn credential(&self) -> Result<&ApiCredential, JudgeError> {
        self.credential
            .as_ref()
            .ok_or_else(|| JudgeError::Auth("no credential configured".to_string()))
    }
}

#[cfg(test)]
impl Session {
    pub(crate) fn for_tests(credential: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential: credential
                .map(|c| ApiCredential::new(c, CredentialSource::Programmatic, "test key")),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credential", &self.credential)
            .finish()
    }
}

/// Provider wire format for one judge variant.
#[async_trait]
pub trait JudgeBackend: Send + Sync + fmt::Debug {
    fn variant(&self) -> JudgeVariant;

    /// One round trip: send the prompt, return the judge's raw text.
    async fn complete(
        &self,
        session: &Session,
        model_flavor: &str,
        prompt: &JudgePrompt,
    ) -> Result<BackendReply, JudgeError>;
}

/// An interchangeable classifier of observation sets.
#[async_trait]
pub trait Judge: Send + Sync + fmt::Debug {
    /// Caller-chosen name; also names the judge's artifacts.
    fn name(&self) -> &str;

    fn variant(&self) -> JudgeVariant;

    fn model_flavor(&self) -> &str;

    fn is_configured(&self) -> bool;

    /// Establish credential and client state. Call once before classifying;
    /// later calls are no-ops.
    fn configure(&mut self) -> Result<(), ConfigError>;

    /// Classify observations. Never fails: every failure is an `error` verdict.
    /// Persists an artifact at `location` before returning.
    async fn classify(
        &self,
        observations: &ObservationSet,
        mode: JudgeMode,
        location: &ArtifactLocation,
    ) -> Verdict;
}

/// Call limits for one judge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgeOptions {
    /// Bound on one classify call, transport retries included
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for JudgeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one interpretation, before persistence.
struct Interpretation {
    verdict: Verdict,
    raw: Option<String>,
    usage: TokenUsage,
}

impl Interpretation {
    fn failed(error: JudgeError) -> Self {
        Self {
            verdict: Verdict::error(error.to_string()),
            raw: None,
            usage: TokenUsage::default(),
        }
    }
}

/// A judge backed by a hosted or local model.
pub struct ModelJudge<B> {
    name: String,
    config: JudgeConfig,
    backend: B,
    explicit_credential: Option<ApiCredential>,
    session: Option<Session>,
    options: JudgeOptions,
    sink: Arc<dyn ArtifactSink>,
    usage: Arc<UsageTracker>,
}

impl<B: JudgeBackend> ModelJudge<B> {
    /// Create an unconfigured judge.
    ///
    /// [`JudgeConfig`] guarantees the flavor fits its variant; `configure()`
    /// rejects a backend that speaks a different variant.
    pub fn new(
        name: impl Into<String>,
        config: JudgeConfig,
        backend: B,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            backend,
            explicit_credential: None,
            session: None,
            options: JudgeOptions::default(),
            sink,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Use this credential instead of the environment.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.explicit_credential = Some(ApiCredential::new(
            credential,
            CredentialSource::Programmatic,
            self.config.variant().credential_name(),
        ));
        self
    }

    pub fn with_options(mut self, options: JudgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a usage tracker with other judges or the orchestrator.
    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    async fn interpret(
        &self,
        session: &Session,
        observations: &ObservationSet,
        mode: JudgeMode,
    ) -> Interpretation {
        let prompt = JudgePrompt::render(observations, mode);
        let flavor = self.config.model_flavor();

        tracing::debug!(
            judge = %self.name,
            variant = %self.config.variant(),
            flavor,
            mode = %mode,
            records = observations.len(),
            "Sending observations to judge"
        );

        let call = with_transport_retries(&self.options.retry, &self.name, || {
            self.backend.complete(session, flavor, &prompt)
        });

        let reply = match tokio::time::timeout(self.options.timeout, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Interpretation::failed(e),
            Err(_) => return Interpretation::failed(JudgeError::Timeout(self.options.timeout)),
        };

        let verdict = match extract(&reply.text, mode) {
            Ok(verdict) => verdict,
            Err(source) => {
                let error = JudgeError::Extraction {
                    source,
                    raw: reply.text.trim().to_string(),
                };
                Verdict::error(error.to_string())
            }
        };

        Interpretation {
            verdict,
            raw: Some(reply.text),
            usage: reply.usage,
        }
    }
}

impl<B> fmt::Debug for ModelJudge<B>
where
    B: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelJudge")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("credential", &self.explicit_credential)
            .field("configured", &self.session.is_some())
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl<B: JudgeBackend> Judge for ModelJudge<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn variant(&self) -> JudgeVariant {
        self.config.variant()
    }

    fn model_flavor(&self) -> &str {
        self.config.model_flavor()
    }

    fn is_configured(&self) -> bool {
        self.session.is_some()
    }

    fn configure(&mut self) -> Result<(), ConfigError> {
        if self.session.is_some() {
            tracing::debug!(judge = %self.name, "Judge already configured");
            return Ok(());
        }

        let variant = self.config.variant();
        if self.backend.variant() != variant {
            return Err(ConfigError::BackendMismatch {
                config: variant.to_string(),
                backend: self.backend.variant().to_string(),
            });
        }

        let credential = if variant.requires_credential() {
            Some(ApiCredential::resolve(self.explicit_credential.take(), variant)?)
        } else {
            None
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        tracing::info!(
            judge = %self.name,
            variant = %variant,
            flavor = self.config.model_flavor(),
            credential_source = ?credential.as_ref().map(|c| c.source()),
            "Judge configured"
        );

        self.session = Some(Session { client, credential });
        Ok(())
    }

    async fn classify(
        &self,
        observations: &ObservationSet,
        mode: JudgeMode,
        location: &ArtifactLocation,
    ) -> Verdict {
        let outcome = match &self.session {
            Some(session) => self.interpret(session, observations, mode).await,
            None => Interpretation::failed(JudgeError::NotConfigured(self.name.clone())),
        };
        let verdict = outcome.verdict;

        self.usage.record(&self.name, &outcome.usage, verdict.is_error());

        if verdict.is_error() {
            tracing::warn!(
                judge = %self.name,
                scan_target = %observations.target,
                cause = verdict.explanation.as_deref().unwrap_or_default(),
                "Judge returned an error verdict"
            );
        } else {
            tracing::debug!(judge = %self.name, status = %verdict.status, "Judge verdict");
        }

        let artifact = VerdictArtifact {
            judge: self.name.clone(),
            variant: self.config.variant(),
            model_flavor: self.config.model_flavor().to_string(),
            mode,
            target: observations.target.clone(),
            attempt: location.attempt(),
            observation_count: observations.len(),
            verdict: verdict.clone(),
            raw_response: outcome.raw,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.sink.persist(location, &artifact).await {
            tracing::warn!(judge = %self.name, error = %e, "Failed to persist verdict artifact");
        }

        verdict
    }
}
