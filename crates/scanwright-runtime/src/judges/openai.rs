//! OpenAI-hosted judge backend (chat completions).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scanwright_core::JudgeVariant;

use super::transport::send_json;
use super::{BackendReply, JudgeBackend, JudgeError, Session, TokenUsage};
use crate::prompts::JudgePrompt;

/// Chat completions against `{base_url}/chat/completions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiBackend {
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Reasoning models take neither a system role nor sampling parameters.
fn is_reasoning_model(flavor: &str) -> bool {
    flavor.starts_with("o1")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

fn request_body<'a>(flavor: &'a str, prompt: &'a JudgePrompt) -> ChatRequest<'a> {
    if is_reasoning_model(flavor) {
        return ChatRequest {
            model: flavor,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.folded().into(),
            }],
            temperature: None,
            top_p: None,
        };
    }

    ChatRequest {
        model: flavor,
        messages: vec![
            ChatMessage {
                role: "system",
                content: prompt.system.into(),
            },
            ChatMessage {
                role: "user",
                content: prompt.user.as_str().into(),
            },
        ],
        temperature: Some(prompt.temperature),
        top_p: Some(1.0),
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl JudgeBackend for OpenAiBackend {
    fn variant(&self) -> JudgeVariant {
        JudgeVariant::Gpt
    }

    async fn complete(
        &self,
        session: &Session,
        model_flavor: &str,
        prompt: &JudgePrompt,
    ) -> Result<BackendReply, JudgeError> {
        let credential = session.credential()?;
        let body = request_body(model_flavor, prompt);

        let request = session
            .client()
            .post(self.endpoint())
            .bearer_auth(credential.expose())
            .json(&body);
        let response: ChatResponse = send_json(request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| JudgeError::Decode("response contained no message content".to_string()))?;

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(BackendReply { text, usage })
    }
}
