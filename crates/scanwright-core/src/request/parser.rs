//! Scan request parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::schema::validate_request_schema;
use crate::configuration::join_tokens;
use crate::types::JudgeMode;
use crate::variants::{JudgeConfig, JudgeVariant};
use crate::ConfigError;

/// Probe parameters of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeParams {
    targets: Vec<String>,
    configuration: Vec<String>,
    save_dir: PathBuf,
}

impl ProbeParams {
    /// Targets in request order. Never empty.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Base configuration tokens for the first probe.
    pub fn configuration_tokens(&self) -> &[String] {
        &self.configuration
    }

    /// Base configuration as one string.
    pub fn base_configuration(&self) -> String {
        join_tokens(&self.configuration)
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }
}

/// Judge parameters of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgeParams {
    config: JudgeConfig,
    mode: JudgeMode,
}

impl JudgeParams {
    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    pub fn variant(&self) -> JudgeVariant {
        self.config.variant()
    }

    pub fn model_flavor(&self) -> &str {
        self.config.model_flavor()
    }

    pub fn mode(&self) -> JudgeMode {
        self.mode
    }
}

/// A validated front-end request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRequest {
    pub probe: ProbeParams,
    pub judge: JudgeParams,

    /// Raw `runtime` block, interpreted by the runtime crate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    probe: RawProbe,
    judge: RawJudge,
    #[serde(default)]
    runtime: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    targets: Vec<String>,
    configuration: Vec<String>,
    save_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawJudge {
    variant: String,
    model_flavor: String,
    mode: String,
}

impl ScanRequest {
    /// Validate an already-decoded request value.
    ///
    /// Order: schema shape, then variant, flavor and mode.
    pub fn from_value(value: JsonValue) -> Result<Self, ConfigError> {
        validate_request_schema(&value).map_err(ConfigError::Schema)?;

        let raw: RawRequest = serde_json::from_value(value)?;

        let variant: JudgeVariant = raw.judge.variant.parse()?;
        let config = JudgeConfig::for_variant(variant, raw.judge.model_flavor.trim())?;
        let mode: JudgeMode = raw.judge.mode.parse()?;

        let probe = Self::validate_probe(raw.probe)?;

        Ok(Self {
            probe,
            judge: JudgeParams { config, mode },
            runtime: raw.runtime,
        })
    }

    /// Parse a request from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a request from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a request file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Replace the targets, e.g. from command-line overrides.
    pub fn with_targets(mut self, targets: Vec<String>) -> Result<Self, ConfigError> {
        self.probe.targets = Self::validate_targets(targets)?;
        Ok(self)
    }

    /// Replace the requested judge mode.
    pub fn with_mode(mut self, mode: JudgeMode) -> Self {
        self.judge.mode = mode;
        self
    }

    fn validate_probe(raw: RawProbe) -> Result<ProbeParams, ConfigError> {
        let mut targets = raw.targets;
        if let Some(target) = raw.target {
            targets.insert(0, target);
        }

        let configuration: Vec<String> = raw
            .configuration
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if configuration.is_empty() {
            return Err(ConfigError::InvalidRequest(
                "probe.configuration has no non-blank tokens".to_string(),
            ));
        }

        Ok(ProbeParams {
            targets: Self::validate_targets(targets)?,
            configuration,
            save_dir: raw.save_dir,
        })
    }

    fn validate_targets(targets: Vec<String>) -> Result<Vec<String>, ConfigError> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(targets.len());

        for target in targets {
            let target = target.trim().to_string();
            if target.is_empty() {
                return Err(ConfigError::InvalidRequest("blank target".to_string()));
            }
            // Each target gets its own save sub-directory
            if !seen.insert(target.clone()) {
                return Err(ConfigError::InvalidRequest(format!(
                    "Duplicate target: {}",
                    target
                )));
            }
            out.push(target);
        }

        if out.is_empty() {
            return Err(ConfigError::InvalidRequest("no targets given".to_string()));
        }
        Ok(out)
    }
}
