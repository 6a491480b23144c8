//! Core types: observations, verdicts and judge modes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// One discrete finding from a probe.
///
/// Field aliases accept the capitalized keys emitted by the
/// scan wrapper (`IP`, `Protocol`, `Port`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Host address or name
    #[serde(alias = "IP", alias = "ip")]
    pub host: String,

    /// Transport protocol (e.g. "tcp")
    #[serde(alias = "Protocol")]
    pub protocol: String,

    /// Port number
    #[serde(alias = "Port")]
    pub port: u16,

    /// Port state (e.g. "open", "filtered")
    #[serde(alias = "State")]
    pub state: String,

    /// Service name
    #[serde(default, alias = "Name")]
    pub name: String,

    /// Service product
    #[serde(default, alias = "Product")]
    pub product: String,

    /// Service version
    #[serde(default, alias = "Version")]
    pub version: String,
}

impl ObservationRecord {
    /// Create a record with empty service details.
    pub fn new(
        host: impl Into<String>,
        protocol: impl Into<String>,
        port: u16,
        state: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            protocol: protocol.into(),
            port,
            state: state.into(),
            name: String::new(),
            product: String::new(),
            version: String::new(),
        }
    }

    /// Attach service details.
    pub fn with_service(
        mut self,
        name: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self.product = product.into();
        self.version = version.into();
        self
    }
}

/// The full output of one probe invocation.
///
/// Records are kept in first-seen order and are unique under full-record
/// equality; record order carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredObservationSet")]
pub struct ObservationSet {
    /// Name of the scan (e.g. "scan_2026-10-17_09-30-00")
    pub name: String,

    /// Target that was probed
    pub target: String,

    /// Configuration string that produced the set
    pub configuration: String,

    /// When the probe finished
    pub observed_at: DateTime<Utc>,

    records: Vec<ObservationRecord>,
}

/// Serialized form; records are deduplicated on the way in.
#[derive(Deserialize)]
struct StoredObservationSet {
    name: String,
    target: String,
    configuration: String,
    observed_at: DateTime<Utc>,
    records: Vec<ObservationRecord>,
}

impl From<StoredObservationSet> for ObservationSet {
    fn from(stored: StoredObservationSet) -> Self {
        let mut set = Self {
            name: stored.name,
            target: stored.target,
            configuration: stored.configuration,
            observed_at: stored.observed_at,
            records: Vec::with_capacity(stored.records.len()),
        };
        set.extend(stored.records);
        set
    }
}

impl ObservationSet {
    /// Create a set stamped with the current time. Duplicate records collapse.
    pub fn new(
        target: impl Into<String>,
        configuration: impl Into<String>,
        records: Vec<ObservationRecord>,
    ) -> Self {
        let observed_at = Utc::now();
        let mut set = Self {
            name: format!("scan_{}", observed_at.format("%Y-%m-%d_%H-%M-%S")),
            target: target.into(),
            configuration: configuration.into(),
            observed_at,
            records: Vec::with_capacity(records.len()),
        };
        set.extend(records);
        set
    }

    /// An empty set for the given target and configuration.
    pub fn empty(target: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self::new(target, configuration, Vec::new())
    }

    /// Override the generated name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Records in first-seen order.
    pub fn records(&self) -> &[ObservationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set-union `other` into `self`. Returns how many records were new.
    ///
    /// Idempotent: merging a set with itself, or merging the same
    /// observations twice, leaves the set unchanged.
    pub fn merge(&mut self, other: &ObservationSet) -> usize {
        let before = self.records.len();
        self.extend(other.records.iter().cloned());
        self.records.len() - before
    }

    /// Non-mutating variant of [`merge`](Self::merge).
    pub fn merged(&self, other: &ObservationSet) -> ObservationSet {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    fn extend(&mut self, records: impl IntoIterator<Item = ObservationRecord>) {
        let mut seen: HashSet<ObservationRecord> = self.records.iter().cloned().collect();
        for record in records {
            if seen.insert(record.clone()) {
                self.records.push(record);
            }
        }
    }

    /// Render the records as the JSON array handed to judges.
    pub fn to_prompt_payload(&self) -> String {
        serde_json::to_string_pretty(&self.records).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Classification returned by a judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// Results are usable as-is
    Completed,

    /// Results are missing information; probe again
    Incomplete,

    /// Results look unreliable; probe again
    FalsePositiveRich,

    /// Nothing was observed, so no judge was asked
    Empty,

    /// The judge call failed
    Error,
}

impl VerdictStatus {
    /// Whether this status sends the loop to Retrying.
    pub fn needs_retry(&self) -> bool {
        matches!(self, VerdictStatus::Incomplete | VerdictStatus::FalsePositiveRich)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Completed => "completed",
            VerdictStatus::Incomplete => "incomplete",
            VerdictStatus::FalsePositiveRich => "false_positive_rich",
            VerdictStatus::Empty => "empty",
            VerdictStatus::Error => "error",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one judge call.
///
/// An `error` verdict never carries next arguments; its explanation holds
/// the failure description instead of analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(default)]
    pub next_arguments: Vec<String>,
}

impl Verdict {
    pub fn new(status: VerdictStatus) -> Self {
        Self {
            status,
            explanation: None,
            next_arguments: Vec::new(),
        }
    }

    /// An `error` verdict carrying a human-readable cause.
    pub fn error(cause: impl Into<String>) -> Self {
        let cause = cause.into();
        let cause = if cause.trim().is_empty() {
            "judge returned an empty response".to_string()
        } else {
            cause
        };
        Self {
            status: VerdictStatus::Error,
            explanation: Some(cause),
            next_arguments: Vec::new(),
        }
    }

    /// The verdict reported when a probe yields nothing.
    pub fn empty() -> Self {
        Self {
            status: VerdictStatus::Empty,
            explanation: Some("No observations available for classification.".to_string()),
            next_arguments: Vec::new(),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Attach suggested arguments. Ignored on `error` verdicts.
    pub fn with_next_arguments(mut self, next_arguments: Vec<String>) -> Self {
        if self.status != VerdictStatus::Error {
            self.next_arguments = next_arguments;
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == VerdictStatus::Error
    }

    /// Suggested arguments joined into one configuration string.
    pub fn suggested_configuration(&self) -> Option<String> {
        if self.next_arguments.is_empty() {
            None
        } else {
            Some(crate::configuration::join_tokens(&self.next_arguments))
        }
    }
}

/// Controls the request shape sent to a judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeMode {
    /// Ask for a category, free-form answer allowed
    #[serde(alias = "normal")]
    Plain,

    /// Ask for the bare category with deterministic decoding
    Restricted,

    /// Ask for a structured payload with explanation and next arguments
    #[serde(alias = "suggest")]
    Suggesting,
}

impl JudgeMode {
    pub const ALL: [JudgeMode; 3] = [JudgeMode::Plain, JudgeMode::Restricted, JudgeMode::Suggesting];

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeMode::Plain => "plain",
            JudgeMode::Restricted => "restricted",
            JudgeMode::Suggesting => "suggesting",
        }
    }

    /// Restricted requests are sent with zero response variability.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, JudgeMode::Restricted)
    }

    /// Only suggesting mode ever populates `next_arguments`.
    pub fn yields_suggestions(&self) -> bool {
        matches!(self, JudgeMode::Suggesting)
    }
}

impl fmt::Display for JudgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JudgeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" | "normal" => Ok(JudgeMode::Plain),
            "restricted" => Ok(JudgeMode::Restricted),
            "suggesting" | "suggest" => Ok(JudgeMode::Suggesting),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}
