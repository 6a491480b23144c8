//! Locally hosted judge backend (Ollama `/api/chat`).
//!
//! No credential: the session's client is used as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scanwright_core::JudgeVariant;

use super::transport::send_json;
use super::{BackendReply, JudgeBackend, JudgeError, Session, TokenUsage};
use crate::prompts::JudgePrompt;

/// Non-streaming chat against `{base_url}/api/chat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaBackend {
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

fn request_body<'a>(flavor: &'a str, prompt: &'a JudgePrompt) -> ChatRequest<'a> {
    ChatRequest {
        model: flavor,
        messages: [
            ChatMessage {
                role: "system",
                content: prompt.system,
            },
            ChatMessage {
                role: "user",
                content: &prompt.user,
            },
        ],
        stream: false,
        options: ChatOptions {
            temperature: prompt.temperature,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl JudgeBackend for OllamaBackend {
    fn variant(&self) -> JudgeVariant {
        JudgeVariant::Ollama
    }

    async fn complete(
        &self,
        session: &Session,
        model_flavor: &str,
        prompt: &JudgePrompt,
    ) -> Result<BackendReply, JudgeError> {
        let request = session
            .client()
            .post(self.endpoint())
            .json(&request_body(model_flavor, prompt));
        let response: ChatResponse = send_json(request).await?;

        let text = response
            .message
            .map(|m| m.content)
            .ok_or_else(|| JudgeError::Decode("response contained no message".to_string()))?;

        Ok(BackendReply {
            text,
            usage: TokenUsage {
                prompt_tokens: response.prompt_eval_count,
                completion_tokens: response.eval_count,
            },
        })
    }
}
