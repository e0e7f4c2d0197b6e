/// Chat completion calls for AI tool nodes
///
/// Both supported providers speak the OpenAI chat-completions protocol; Gemini through
/// its OpenAI-compatible endpoint. The engine only depends on the `LlmClient` contract:
/// prompts in, text out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::UpstreamServiceError;

/// Used when a node leaves its system prompt blank
pub const DEFAULT_JSON_SYSTEM_PROMPT: &str = "You are a helpful assistant. Always respond ONLY in valid JSON format. Do not include explanations or formatting, just return the JSON object.";

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    pub provider: LlmProvider,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Ask the provider for a JSON object response
    pub json_mode: bool,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Raw message content of the first choice
    async fn invoke(&self, request: LlmRequest) -> Result<String, UpstreamServiceError>;
}

/// Wrap model output as the node result: parsed JSON when it parses, raw text otherwise
pub fn parse_llm_output(text: &str) -> Value {
    let result = serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()));
    json!({ "result": result })
}

/// Chat-completions client over reqwest
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    openai_base_url: String,
    gemini_base_url: String,
}

impl ChatCompletionsClient {
    pub fn new(
        openai_base_url: impl Into<String>,
        gemini_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            openai_base_url: openai_base_url.into(),
            gemini_base_url: gemini_base_url.into(),
        })
    }

    fn endpoint(&self, provider: LlmProvider) -> String {
        let base = match provider {
            LlmProvider::OpenAi => &self.openai_base_url,
            LlmProvider::Gemini => &self.gemini_base_url,
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn invoke(&self, request: LlmRequest) -> Result<String, UpstreamServiceError> {
        let mut body = json!({
            "model": request.model,
            "temperature": DEFAULT_TEMPERATURE,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        tracing::debug!("🤖 LLM request: {:?} model={}", request.provider, request.model);

        let response = self
            .client
            .post(self.endpoint(request.provider))
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| UpstreamServiceError::Llm(format!("invalid response body: {}", e)))?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(UpstreamServiceError::Llm(message));
        }

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| UpstreamServiceError::Llm("response has no message content".into()))
    }
}
