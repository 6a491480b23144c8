//! Gemini-hosted judge backend (`generateContent`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scanwright_core::JudgeVariant;

use super::transport::send_json;
use super::{BackendReply, JudgeBackend, JudgeError, Session, TokenUsage};
use crate::prompts::JudgePrompt;

/// Harm categories relaxed for scan output, which routinely reads like
/// attack tooling.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// `generateContent` against `{base_url}/{model_flavor}`.
///
/// Flavors are resource names (`models/gemini-1.5-pro`), so the flavor
/// is the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiBackend {
    base_url: String,
}

impl GeminiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, model_flavor: &str) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url,
            model_flavor.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    safety_settings: Vec<SafetySetting>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini 1.0 has no system instruction, so every flavor gets the user
/// template alone.
fn request_body(prompt: &JudgePrompt) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: &prompt.user }],
        }],
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
        generation_config: GenerationConfig {
            temperature: prompt.temperature,
        },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[async_trait]
impl JudgeBackend for GeminiBackend {
    fn variant(&self) -> JudgeVariant {
        JudgeVariant::Gemini
    }

    async fn complete(
        &self,
        session: &Session,
        model_flavor: &str,
        prompt: &JudgePrompt,
    ) -> Result<BackendReply, JudgeError> {
        let credential = session.credential()?;

        let request = session
            .client()
            .post(self.endpoint(model_flavor))
            .header("x-goog-api-key", credential.expose())
            .json(&request_body(prompt));
        let response: GenerateResponse = send_json(request).await?;

        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty());

        match text {
            Some(text) => Ok(BackendReply { text, usage }),
            None => {
                let reason = response
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .map(|r| format!(" (blocked: {})", r))
                    .unwrap_or_default();
                Err(JudgeError::Decode(format!("response contained no candidate text{}", reason)))
            }
        }
    }
}
