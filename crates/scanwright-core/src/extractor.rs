//! Response extraction: judge free text to [`Verdict`].
//!
//! Judges are prompted for a category or a JSON object and reliably wrap
//! either in commentary. Extraction is pure and never calls a service.
//!
//! - `plain` / `restricted`: the trimmed text (or its first line, with the
//!   remaining lines kept as explanation) is matched case-insensitively
//!   against the status labels. Unrecognized text becomes an `error`
//!   verdict that preserves the raw text.
//! - `suggesting`: the span from the first `{` to the last `}` is decoded
//!   as an object with `classification`, `analysis_description` and
//!   `next_arguments`. No braces, or a span that does not decode, is an
//!   [`ExtractionError`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types::{JudgeMode, Verdict, VerdictStatus};

lazy_static! {
    static ref LABEL_SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Judge output could not be turned into a verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no structured payload found")]
    NoStructuredPayload,
}

/// Match a category label against the status enumeration.
///
/// Case, quoting, punctuation and separators are ignored, so
/// `'False Positive Rich'.` and `false_positive_rich` both match.
pub fn normalize_status(raw: &str) -> Option<VerdictStatus> {
    let lowered = raw.trim().to_lowercase();
    let label = LABEL_SEPARATORS.replace_all(&lowered, "_");
    match label.trim_matches('_') {
        "completed" => Some(VerdictStatus::Completed),
        "incomplete" => Some(VerdictStatus::Incomplete),
        "false_positive_rich" => Some(VerdictStatus::FalsePositiveRich),
        _ => None,
    }
}

/// Slice from the first `{` to the last `}`, inclusive.
pub fn carve_payload(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Turn raw judge text into a verdict for the given mode.
pub fn extract(raw: &str, mode: JudgeMode) -> Result<Verdict, ExtractionError> {
    match mode {
        JudgeMode::Plain | JudgeMode::Restricted => Ok(extract_label(raw)),
        JudgeMode::Suggesting => extract_payload(raw),
    }
}

fn extract_label(raw: &str) -> Verdict {
    let text = raw.trim();

    if let Some(status) = normalize_status(text) {
        return Verdict::new(status);
    }

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if let Some(first) = lines.next() {
        if let Some(status) = normalize_status(first) {
            let rest = lines.collect::<Vec<_>>().join("\n");
            let verdict = Verdict::new(status);
            return if rest.is_empty() {
                verdict
            } else {
                verdict.with_explanation(rest)
            };
        }
    }

    // Bare-category prompts sometimes still come back as a JSON object.
    // Read its category, never its suggestions.
    if let Some(verdict) = decode_payload(text).and_then(|fields| {
        normalize_status(fields.classification.as_deref()?).map(|status| {
            let verdict = Verdict::new(status);
            match fields.analysis_description {
                Some(explanation) => verdict.with_explanation(explanation),
                None => verdict,
            }
        })
    }) {
        return verdict;
    }

    Verdict::error(text)
}

fn extract_payload(raw: &str) -> Result<Verdict, ExtractionError> {
    let fields = decode_payload(raw).ok_or(ExtractionError::NoStructuredPayload)?;

    let status = match fields.classification.as_deref().and_then(normalize_status) {
        Some(status) => status,
        None => return Ok(Verdict::error(raw.trim())),
    };

    let mut verdict = Verdict::new(status).with_next_arguments(fields.next_arguments);
    verdict.explanation = fields.analysis_description;
    Ok(verdict)
}

struct PayloadFields {
    classification: Option<String>,
    analysis_description: Option<String>,
    next_arguments: Vec<String>,
}

fn decode_payload(raw: &str) -> Option<PayloadFields> {
    let slice = carve_payload(raw)?;
    let value: JsonValue = match serde_json::from_str(slice) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Carved payload is not valid JSON");
            return None;
        }
    };
    let object = value.as_object()?;

    Some(PayloadFields {
        classification: object
            .get("classification")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        analysis_description: object
            .get("analysis_description")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        next_arguments: object
            .get("next_arguments")
            .map(string_sequence)
            .unwrap_or_default(),
    })
}

/// An array of strings, or nothing. Any other shape degrades to "no suggestion".
fn string_sequence(value: &JsonValue) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    let mut tokens = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(token) if !token.trim().is_empty() => tokens.push(token.trim().to_string()),
            Some(_) => {}
            None => return Vec::new(),
        }
    }
    tokens
}
