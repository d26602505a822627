//! Chat-model providers.
//!
//! | Provider | Endpoint | Structured output |
//! |----------|----------|-------------------|
//! | [`OpenAiChatModel`] | `POST {base}/chat/completions` | `response_format.json_schema` |
//! | [`GeminiChatModel`] | `POST {base}/v1beta/models/{model}:generateContent` | `generationConfig.responseJsonSchema` |
//!
//! Both retry with exponential backoff (1s, 2s, 4s, ... capped at 32s):
//! HTTP 429, 5xx and network errors are retried up to `max_retries` times,
//! any other 4xx fails immediately.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::schema::StructuredSchema;
use crate::config::{LlmConfig, LlmProviderKind};
use crate::error::{Error, Result};

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A model that answers a conversation with JSON matching a schema.
///
/// Implementations return the parsed JSON reply; checking it against the
/// schema is the caller's job.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &StructuredSchema,
    ) -> Result<Value>;
}

/// Build the provider named in `config`.
///
/// Fails with [`Error::Config`] when the API key variable is unset.
pub fn build_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    let key_env = config.api_key_env();
    let api_key = std::env::var(key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            Error::config(format!(
                "{key_env} must be set to use the {} provider",
                config.name
            ))
        })?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    debug!(provider = %config.name, model = %config.model, "building chat model");
    match config.name {
        LlmProviderKind::Openai => Ok(Box::new(OpenAiChatModel {
            client,
            api_key,
            config: config.clone(),
        })),
        LlmProviderKind::Gemini => Ok(Box::new(GeminiChatModel {
            client,
            api_key,
            config: config.clone(),
        })),
    }
}

/// Defers provider construction (and the API key check) to the first call.
pub struct LazyChatModel {
    config: LlmConfig,
    cell: OnceCell<Box<dyn ChatModel>>,
}

impl LazyChatModel {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<&dyn ChatModel> {
        let model = self
            .cell
            .get_or_try_init(|| async { build_chat_model(&self.config) })
            .await?;
        Ok(model.as_ref())
    }
}

#[async_trait]
impl ChatModel for LazyChatModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &StructuredSchema,
    ) -> Result<Value> {
        self.model().await?.complete_structured(messages, schema).await
    }
}

/// Send the request built by `request` and decode the JSON reply, retrying
/// transient failures.
async fn post_with_retry(
    request: impl Fn() -> reqwest::RequestBuilder,
    url: &str,
    max_retries: u32,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        Error::bad_llm_response(format!("provider reply is not JSON: {e}"))
                    });
                }

                let body = response.text().await.unwrap_or_default();
                let err = Error::Transport {
                    status: status.as_u16(),
                    url: url.to_string(),
                    body,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(attempt, status = status.as_u16(), "LLM request failed, retrying");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                warn!(attempt, error = %e, "LLM request failed, retrying");
                last_err = Some(e.into());
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::bad_llm_response("LLM request failed after retries")))
}

fn parse_json_text(text: &str) -> Result<Value> {
    serde_json::from_str(text.trim())
        .map_err(|e| Error::bad_llm_response(format!("model output is not valid JSON: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════
// OpenAI
// ═══════════════════════════════════════════════════════════════════════

pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAiChatModel {
    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn request_body(&self, messages: &[ChatMessage], schema: &StructuredSchema) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": false,
                    "schema": schema.schema,
                }
            }
        });
        if let Some(effort) = &self.config.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &StructuredSchema,
    ) -> Result<Value> {
        let url = self.url();
        let body = self.request_body(messages, schema);
        let reply = post_with_retry(
            || self.client.post(&url).bearer_auth(&self.api_key).json(&body),
            &url,
            self.config.max_retries,
        )
        .await?;

        let message = &reply["choices"][0]["message"];
        if let Some(refusal) = message["refusal"].as_str() {
            return Err(Error::bad_llm_response(format!("model refused: {refusal}")));
        }
        let content = message["content"]
            .as_str()
            .ok_or_else(|| Error::bad_llm_response("reply has no message content"))?;
        parse_json_text(content)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Gemini
// ═══════════════════════════════════════════════════════════════════════

pub struct GeminiChatModel {
    client: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl GeminiChatModel {
    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1beta/models/{}:generateContent", self.config.model)
    }

    fn request_body(&self, messages: &[ChatMessage], schema: &StructuredSchema) -> Value {
        let system: Vec<Value> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| json!({ "text": m.content }))
            .collect();
        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| json!({ "role": "user", "parts": [{ "text": m.content }] }))
            .collect();

        let mut generation_config = json!({
            "responseMimeType": "application/json",
            "responseJsonSchema": schema.schema,
        });
        if let Some(level) = &self.config.reasoning_effort {
            generation_config["thinkingConfig"] = json!({ "thinkingLevel": level });
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": system });
        }
        body
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &StructuredSchema,
    ) -> Result<Value> {
        let url = self.url();
        let body = self.request_body(messages, schema);
        let reply = post_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
            },
            &url,
            self.config.max_retries,
        )
        .await?;

        let parts = reply["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                let reason = reply["promptFeedback"]["blockReason"]
                    .as_str()
                    .or_else(|| reply["candidates"][0]["finishReason"].as_str())
                    .unwrap_or("no candidates");
                Error::bad_llm_response(format!("reply has no content: {reason}"))
            })?;
        let text: String = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect();
        parse_json_text(&text)
    }
}
