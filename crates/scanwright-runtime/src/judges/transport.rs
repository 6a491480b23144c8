//! HTTP plumbing shared by the remote and local backends.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;

use super::JudgeError;

const MAX_ERROR_BODY: usize = 500;

/// Send a prepared request and decode a JSON success body.
///
/// 429 becomes `RateLimited`, 401/403 `Auth`, other non-success statuses
/// `Api` with the provider's message when one can be found.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, JudgeError> {
    let response = request
        .send()
        .await
        .map_err(|e| JudgeError::Transport(e.to_string()))?;

    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(JudgeError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => JudgeError::Auth(message),
            _ => JudgeError::Api {
                status: status.as_u16(),
                message,
            },
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| JudgeError::Transport(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| JudgeError::Decode(e.to_string()))
}

/// Pull a readable message out of a provider error body.
///
/// Understands `{"error": {"message": ...}}` (OpenAI, Gemini) and
/// `{"error": "..."}` (Ollama); anything else is returned truncated.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<JsonValue>(body) {
        let error = &value["error"];
        if let Some(message) = error["message"].as_str().or_else(|| error.as_str()) {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty error body".to_string();
    }
    let mut end = trimmed.len().min(MAX_ERROR_BODY);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
