//! Choosing the next probe configuration.
//!
//! Priority: a usable judge suggestion, otherwise the static fallback. A
//! suggestion is usable only in suggesting mode, when it is non-empty and
//! differs from the probe that was just run.

use serde::Serialize;

use scanwright_core::{normalize_configuration, same_configuration, JudgeMode, Verdict};

/// Why the static fallback was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Mode does not produce suggestions
    NotSuggesting,
    /// Judge suggested nothing (or something malformed)
    NoSuggestion,
    /// Suggestion repeats the probe that was just run
    RepeatsCurrent,
}

/// The next probe to run and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NextProbe {
    Suggested { configuration: String },
    StaticFallback {
        configuration: String,
        reason: FallbackReason,
    },
}

impl NextProbe {
    pub fn configuration(&self) -> &str {
        match self {
            NextProbe::Suggested { configuration } => configuration,
            NextProbe::StaticFallback { configuration, .. } => configuration,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, NextProbe::StaticFallback { .. })
    }
}

/// Pick the next probe configuration after a retry-worthy verdict.
pub fn choose_next_probe(
    verdict: &Verdict,
    mode: JudgeMode,
    current: &str,
    fallback: &str,
) -> NextProbe {
    let fallback_with = |reason| NextProbe::StaticFallback {
        configuration: normalize_configuration(fallback),
        reason,
    };

    if !mode.yields_suggestions() {
        return fallback_with(FallbackReason::NotSuggesting);
    }

    match verdict.suggested_configuration() {
        None => fallback_with(FallbackReason::NoSuggestion),
        Some(suggestion) if same_configuration(&suggestion, current) => {
            fallback_with(FallbackReason::RepeatsCurrent)
        }
        Some(suggestion) => NextProbe::Suggested {
            configuration: normalize_configuration(&suggestion),
        },
    }
}
