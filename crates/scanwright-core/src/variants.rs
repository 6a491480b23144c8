//! Judge variants and their accepted model flavors.
//!
//! The variant set is closed: two remote providers and one local one. Each
//! variant accepts a fixed list of flavors, maintained here next to the
//! registry rather than loaded at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

const GPT_FLAVORS: &[&str] = &["gpt-4", "gpt-4o", "gpt-4o-mini", "o1", "o1-mini"];

const GEMINI_FLAVORS: &[&str] = &[
    "models/gemini-1.5-pro",
    "models/gemini-1.5-flash",
    "models/gemini-1.5-flash-8b",
    "models/gemini-1.0-pro",
];

const OLLAMA_FLAVORS: &[&str] = &[
    "llama3.3",
    "llama3.2",
    "llama3.1",
    "llama3",
    "llama2",
    "gemma2",
    "gemma",
    "jimscard/whiterabbit-neo",
    "ALIENTELLIGENCE/cybersecuritythreatanalysis",
];

/// A judge backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeVariant {
    /// OpenAI-hosted chat models
    #[serde(alias = "openai")]
    Gpt,

    /// Google-hosted Gemini models
    #[serde(alias = "google")]
    Gemini,

    /// Locally hosted models served by Ollama
    #[serde(alias = "local")]
    Ollama,
}

impl JudgeVariant {
    pub const ALL: [JudgeVariant; 3] = [JudgeVariant::Gpt, JudgeVariant::Gemini, JudgeVariant::Ollama];

    /// Identifier used in requests.
    pub fn id(&self) -> &'static str {
        match self {
            JudgeVariant::Gpt => "gpt",
            JudgeVariant::Gemini => "gemini",
            JudgeVariant::Ollama => "ollama",
        }
    }

    pub fn accepted_flavors(&self) -> &'static [&'static str] {
        match self {
            JudgeVariant::Gpt => GPT_FLAVORS,
            JudgeVariant::Gemini => GEMINI_FLAVORS,
            JudgeVariant::Ollama => OLLAMA_FLAVORS,
        }
    }

    pub fn default_flavor(&self) -> &'static str {
        match self {
            JudgeVariant::Gpt => "gpt-4",
            JudgeVariant::Gemini => "models/gemini-1.5-pro",
            JudgeVariant::Ollama => "gemma2",
        }
    }

    /// Remote variants need a credential; the local one does not.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, JudgeVariant::Ollama)
    }

    /// Environment variable consulted when no credential is passed.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            JudgeVariant::Gpt => Some("OPENAI_API_KEY"),
            JudgeVariant::Gemini => Some("GOOGLE_API_KEY"),
            JudgeVariant::Ollama => None,
        }
    }

    /// Human-readable credential name for error messages.
    pub fn credential_name(&self) -> &'static str {
        match self {
            JudgeVariant::Gpt => "OpenAI API key",
            JudgeVariant::Gemini => "Google API key",
            JudgeVariant::Ollama => "none",
        }
    }

    pub fn accepts_flavor(&self, flavor: &str) -> bool {
        self.accepted_flavors().contains(&flavor)
    }

    /// Reject flavors outside this variant's accepted set.
    pub fn validate_flavor(&self, flavor: &str) -> Result<(), ConfigError> {
        if self.accepts_flavor(flavor) {
            Ok(())
        } else {
            Err(ConfigError::InvalidFlavor {
                variant: self.id().to_string(),
                flavor: flavor.to_string(),
                accepted: self.accepted_flavors(),
            })
        }
    }
}

impl fmt::Display for JudgeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for JudgeVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpt" | "openai" => Ok(JudgeVariant::Gpt),
            "gemini" | "google" => Ok(JudgeVariant::Gemini),
            "ollama" | "local" => Ok(JudgeVariant::Ollama),
            _ => Err(ConfigError::UnknownVariant(s.to_string())),
        }
    }
}

/// A validated variant/flavor pair.
///
/// Construction is the only validation point: an existing `JudgeConfig`
/// always names a known variant and one of its accepted flavors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgeConfig {
    variant: JudgeVariant,
    model_flavor: String,
}

impl JudgeConfig {
    /// Validate a variant identifier and flavor.
    pub fn new(variant_id: &str, model_flavor: &str) -> Result<Self, ConfigError> {
        let variant: JudgeVariant = variant_id.parse()?;
        Self::for_variant(variant, model_flavor)
    }

    /// Validate a flavor for an already-parsed variant.
    pub fn for_variant(variant: JudgeVariant, model_flavor: &str) -> Result<Self, ConfigError> {
        variant.validate_flavor(model_flavor)?;
        Ok(Self {
            variant,
            model_flavor: model_flavor.to_string(),
        })
    }

    pub fn variant(&self) -> JudgeVariant {
        self.variant
    }

    pub fn model_flavor(&self) -> &str {
        &self.model_flavor
    }
}
