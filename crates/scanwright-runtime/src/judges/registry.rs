//! Judge registry: variant identifier to judge instance.
//!
//! The variant set is closed, so creation is a plain match rather than
//! a table of runtime-registered factories. Flavors are checked against
//! the fixed per-variant lists before anything is built.

use std::sync::Arc;

use scanwright_core::{ConfigError, JudgeConfig, JudgeVariant};

use super::{GeminiBackend, Judge, JudgeBackend, JudgeOptions, ModelJudge, OllamaBackend, OpenAiBackend};
use crate::artifacts::{ArtifactSink, FileArtifactSink};
use crate::config::{BaseUrls, RuntimeConfig};
use crate::resilience::{RetryPolicy, UsageTracker};

/// Builds unconfigured judges that share endpoints, limits, the artifact
/// sink and the usage tracker.
pub struct JudgeRegistry {
    base_urls: BaseUrls,
    options: JudgeOptions,
    sink: Arc<dyn ArtifactSink>,
    usage: Arc<UsageTracker>,
}

impl JudgeRegistry {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            base_urls: config.base_urls.clone(),
            options: JudgeOptions {
                timeout: config.judge_timeout,
                retry: RetryPolicy::new(config.transport_retries, config.transport_backoff),
            },
            sink: Arc::new(FileArtifactSink::new()),
            usage: Arc::new(UsageTracker::new()),
        }
    }

    pub fn with_artifact_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Tracker shared by every judge this registry creates.
    pub fn usage(&self) -> Arc<UsageTracker> {
        Arc::clone(&self.usage)
    }

    /// Create an unconfigured judge.
    ///
    /// # Errors
    ///
    /// `UnknownVariant` for an unknown `variant_id`, `InvalidFlavor` when
    /// `model_flavor` is not in that variant's accepted set.
    pub fn create(
        &self,
        variant_id: &str,
        name: &str,
        model_flavor: &str,
        credential: Option<String>,
    ) -> Result<Box<dyn Judge>, ConfigError> {
        let config = JudgeConfig::new(variant_id, model_flavor)?;
        Ok(self.create_for(config, name, credential))
    }

    /// Create an unconfigured judge from an already validated config.
    pub fn create_for(
        &self,
        config: JudgeConfig,
        name: &str,
        credential: Option<String>,
    ) -> Box<dyn Judge> {
        let variant = config.variant();
        let base_url = self.base_urls.for_variant(variant);
        let name = if name.trim().is_empty() {
            variant.id()
        } else {
            name.trim()
        };

        tracing::debug!(judge = name, variant = %variant, base_url = %base_url, "Creating judge");

        let judge: Box<dyn Judge> = match variant {
            JudgeVariant::Gpt => Box::new(self.assemble(name, config, OpenAiBackend::new(base_url), credential)),
            JudgeVariant::Gemini => Box::new(self.assemble(name, config, GeminiBackend::new(base_url), credential)),
            JudgeVariant::Ollama => {
                if credential.is_some() {
                    tracing::debug!(judge = name, "Local judge ignores the supplied credential");
                }
                Box::new(self.assemble(name, config, OllamaBackend::new(base_url), None))
            }
        };
        judge
    }

    fn assemble<B: JudgeBackend>(
        &self,
        name: &str,
        config: JudgeConfig,
        backend: B,
        credential: Option<String>,
    ) -> ModelJudge<B> {
        let judge = ModelJudge::new(name, config, backend, Arc::clone(&self.sink))
            .with_options(self.options)
            .with_usage_tracker(Arc::clone(&self.usage));

        match credential {
            Some(credential) => judge.with_credential(credential),
            None => judge,
        }
    }
}

impl Default for JudgeRegistry {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}
