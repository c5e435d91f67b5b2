/// LLM invoker — the single point of entry for all model calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All LLM interactions MUST go through this module.
///
/// The rest of the system depends on the `LlmInvoker` trait; the Anthropic
/// client below is its only production implementation. Model keys are a
/// fixed menu resolved here so callers never hand the API an arbitrary id.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

/// Model key used when the caller does not pick one.
pub const DEFAULT_MODEL_KEY: &str = "standard";

/// The model menu: opaque keys on the outside, concrete ids in here only.
const MODEL_TABLE: &[(&str, &str)] = &[
    ("standard", "claude-sonnet-4-5"),
    ("fast", "claude-3-5-haiku-latest"),
];

/// Resolves a model key to a concrete model id. Unknown keys fall back to
/// the default model rather than erroring; the key came from a UI menu.
pub fn resolve_model(model_key: &str) -> &'static str {
    MODEL_TABLE
        .iter()
        .find(|(key, _)| *key == model_key)
        .or_else(|| MODEL_TABLE.iter().find(|(key, _)| *key == DEFAULT_MODEL_KEY))
        .map(|(_, id)| *id)
        .expect("model table contains the default key")
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Structured request handed to the invoker. `json_mode` asks the
/// implementation to deliver bare JSON text (fences stripped).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub json_mode: bool,
}

impl ChatRequest {
    /// JSON-mode request. The shared JSON-only system fragment is appended
    /// here so every caller gets the same output contract.
    pub fn json(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: format!("{}\n\n{}", system.into(), prompts::JSON_ONLY_SYSTEM),
            messages: vec![ChatMessage::user(prompt)],
            json_mode: true,
        }
    }

    pub fn text(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: vec![ChatMessage::user(prompt)],
            json_mode: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Capability interface for chat-completion calls.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(
        &self,
        user_id: Uuid,
        model_key: &str,
        request: ChatRequest,
    ) -> Result<ChatResponse, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl ApiResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Production invoker for the Anthropic Messages API, with retry on 429
/// and 5xx using exponential backoff.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    async fn call(&self, model: &str, request: &ChatRequest) -> Result<ApiResponse, LlmError> {
        let request_body = AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            system: &request.system,
            messages: &request.messages,
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let api_response: ApiResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                api_response.usage.input_tokens, api_response.usage.output_tokens
            );

            return Ok(api_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl LlmInvoker for AnthropicClient {
    async fn invoke(
        &self,
        user_id: Uuid,
        model_key: &str,
        request: ChatRequest,
    ) -> Result<ChatResponse, LlmError> {
        let model = resolve_model(model_key);
        debug!(%user_id, model, "invoking chat completion");

        let api_response = self.call(model, &request).await?;
        let raw = api_response.text().ok_or(LlmError::EmptyContent)?;
        let text = if request.json_mode {
            strip_json_fences(raw).to_string()
        } else {
            raw.to_string()
        };

        Ok(ChatResponse {
            text,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        })
    }
}

/// Deserializes a JSON-mode response body into `T`.
pub fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    serde_json::from_str(strip_json_fences(text)).map_err(LlmError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_resolve_model_known_keys() {
        assert_eq!(resolve_model("standard"), "claude-sonnet-4-5");
        assert_eq!(resolve_model("fast"), "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_resolve_model_unknown_key_falls_back() {
        assert_eq!(resolve_model("gpt-17"), resolve_model(DEFAULT_MODEL_KEY));
    }
}
