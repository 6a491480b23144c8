//! Prompt templates for judges.
//!
//! One template per [`JudgeMode`]. The templates differ only in what they
//! demand back: a category, a bare category, or a structured payload with
//! explanation and suggested next arguments. Every variant uses the same
//! three templates.

use scanwright_core::{JudgeMode, ObservationSet};

/// Placeholder replaced with the observation payload.
pub const OBSERVATIONS_PLACEHOLDER: &str = "{observations}";

/// System prompt for variants that accept a separate system role.
pub const SYSTEM_PROMPT: &str = "You are a system that classifies scan results as \
'Completed', 'Incomplete', or 'False Positive Rich', optionally providing additional \
recommendations based on your analysis.";

pub const PLAIN_TEMPLATE: &str = r#"Classify the following scan results as Completed, Incomplete, or False Positive Rich:

{observations}"#;

pub const RESTRICTED_TEMPLATE: &str = r#"Classify the following scan results into one of the following categories:
'Completed', 'Incomplete', or 'False Positive Rich'.
Do not provide any details, only return the category name.

{observations}"#;

pub const SUGGESTING_TEMPLATE: &str = r#"Classify the following scan results into one of the following categories:
'Completed', 'Incomplete', or 'False Positive Rich'.
Then describe what you based the classification on and, if the results are not
complete, suggest the scanner arguments for the next scan.

Respond with a single JSON object and nothing else:
{
  "classification": "Completed" | "Incomplete" | "False Positive Rich",
  "analysis_description": "why you chose this classification",
  "next_arguments": ["-flag", "value", ...]
}

Use an empty list for "next_arguments" when no further scan is needed.

{observations}"#;

/// Template for a mode.
pub fn template(mode: JudgeMode) -> &'static str {
    match mode {
        JudgeMode::Plain => PLAIN_TEMPLATE,
        JudgeMode::Restricted => RESTRICTED_TEMPLATE,
        JudgeMode::Suggesting => SUGGESTING_TEMPLATE,
    }
}

/// Sampling temperature for a mode. Restricted requests are deterministic.
pub fn temperature(mode: JudgeMode) -> f32 {
    if mode.is_deterministic() {
        0.0
    } else {
        1.0
    }
}

/// A rendered judge request, independent of any provider wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgePrompt {
    pub mode: JudgeMode,
    pub system: &'static str,
    pub user: String,
    pub temperature: f32,
}

impl JudgePrompt {
    /// Render the template for `mode` around the observation payload.
    pub fn render(observations: &ObservationSet, mode: JudgeMode) -> Self {
        let user = template(mode).replace(OBSERVATIONS_PLACEHOLDER, &observations.to_prompt_payload());
        Self {
            mode,
            system: SYSTEM_PROMPT,
            user,
            temperature: temperature(mode),
        }
    }

    /// System and user text in one message, for models without a system role.
    pub fn folded(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}
