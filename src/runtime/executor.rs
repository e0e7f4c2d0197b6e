/// Node behavior registry
///
/// One handler per `NodeKind`, dispatched through an exhaustive match so a new kind
/// does not compile until it has a behavior. Every handler follows the same shape:
/// - look up its own `data.state` in the run snapshot by node id
/// - resolve `{{$...}}` placeholders against the accumulated `input`
/// - call out to a collaborator (LLM, HTTP, mail) or format text locally
/// - write its result into `input` under the key chosen by `OutputKeying`
///
/// Triggers pass the context through unchanged; their payload is seeded before the run.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

use super::{
    context::{OutputKeying, RunContext},
    template,
};
use crate::{
    error::UpstreamServiceError,
    services::{
        credentials::{auth_header, require_credential},
        http::{interpret_response, HttpCall},
        llm::{parse_llm_output, LlmProvider, LlmRequest, DEFAULT_JSON_SYSTEM_PROMPT},
        mail::{build_mail_call, DEFAULT_MAIL_ENDPOINT},
        Collaborators,
    },
    workflow::types::NodeKind,
};

/// Configuration of an AI tool node after template resolution
#[derive(Debug, Clone, Default, Deserialize)]
struct AiToolConfig {
    #[serde(default)]
    credential_id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    response_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TextField {
    #[serde(default)]
    label: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TextToolConfig {
    #[serde(default)]
    fields: Vec<TextField>,
}

#[derive(Debug, Clone, Deserialize)]
struct SleepConfig {
    #[serde(default)]
    duration: Value,
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_unit() -> String {
    "seconds".to_string()
}

impl SleepConfig {
    fn to_duration(&self) -> Result<Duration, UpstreamServiceError> {
        // Resolved templates arrive as strings, so accept "5" as well as 5
        let amount = match &self.duration {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| {
            UpstreamServiceError::InvalidConfig(format!("invalid sleep duration: {}", self.duration))
        })?;

        let seconds = match self.unit.to_ascii_lowercase().as_str() {
            "ms" | "milliseconds" => amount / 1000.0,
            "s" | "seconds" => amount,
            "m" | "minutes" => amount * 60.0,
            other => {
                return Err(UpstreamServiceError::InvalidConfig(format!(
                    "unknown sleep unit '{}'",
                    other
                )))
            }
        };
        Duration::try_from_secs_f64(seconds).map_err(|e| {
            UpstreamServiceError::InvalidConfig(format!("sleep duration out of range: {}", e))
        })
    }
}

/// Runs node handlers against shared collaborators
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    collaborators: Collaborators,
    keying: OutputKeying,
    mail_endpoint: String,
}

impl NodeExecutor {
    pub fn new(collaborators: Collaborators, keying: OutputKeying) -> Self {
        Self {
            collaborators,
            keying,
            mail_endpoint: DEFAULT_MAIL_ENDPOINT.to_string(),
        }
    }

    pub fn with_mail_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.mail_endpoint = endpoint.into();
        self
    }

    pub fn keying(&self) -> OutputKeying {
        self.keying
    }

    /// Behavior lookup by wire tag; `None` means the tag has no handler
    pub fn lookup(tag: &str) -> Option<NodeKind> {
        NodeKind::from_tag(tag)
    }

    /// Run one node and return the updated context
    pub async fn execute(
        &self,
        kind: NodeKind,
        mut ctx: RunContext,
        node_id: &str,
    ) -> Result<RunContext, UpstreamServiceError> {
        tracing::info!(node_id, node_type = %kind, "🚀 Starting node execution");
        let start_time = Instant::now();

        let result = match kind {
            NodeKind::ManualTrigger
            | NodeKind::ScheduleTrigger
            | NodeKind::WebhookTrigger
            | NodeKind::FormTrigger => Ok(None),
            NodeKind::OpenAiTool => self.execute_ai_tool(LlmProvider::OpenAi, &ctx, node_id).await.map(Some),
            NodeKind::GeminiAiTool => self.execute_ai_tool(LlmProvider::Gemini, &ctx, node_id).await.map(Some),
            NodeKind::HttpTool => self.execute_http_tool(&ctx, node_id).await.map(Some),
            NodeKind::MailTool => self.execute_mail_tool(&ctx, node_id).await.map(Some),
            NodeKind::TextTool => self.execute_text_tool(&ctx, node_id).map(Some),
            NodeKind::SleepTool => self.execute_sleep_tool(&ctx, node_id).await.map(Some),
        };

        let duration = start_time.elapsed();
        match result {
            Ok(output) => {
                if let Some(output) = output {
                    tracing::debug!("📤 Output data: {}", output);
                    ctx.record_output(self.keying.key_for(node_id, kind.tag()), output);
                }
                tracing::info!(node_id, "✅ Node execution completed in {:?}", duration);
                Ok(ctx)
            }
            Err(e) => {
                tracing::error!(node_id, "❌ Node execution failed in {:?} - Error: {}", duration, e);
                Err(e)
            }
        }
    }

    /// This node's `data.state` with placeholders resolved against `input`
    fn resolved_config(&self, ctx: &RunContext, node_id: &str) -> Result<Value, UpstreamServiceError> {
        let state = ctx.node_state(node_id).ok_or_else(|| {
            UpstreamServiceError::InvalidConfig(format!("node '{}' is not part of the run", node_id))
        })?;
        Ok(template::resolve(state, &ctx.input))
    }

    fn typed_config<T: DeserializeOwned>(
        &self,
        ctx: &RunContext,
        node_id: &str,
    ) -> Result<T, UpstreamServiceError> {
        let resolved = self.resolved_config(ctx, node_id)?;
        let resolved = if resolved.is_null() { Value::Object(Map::new()) } else { resolved };
        serde_json::from_value(resolved)
            .map_err(|e| UpstreamServiceError::InvalidConfig(format!("node '{}': {}", node_id, e)))
    }

    async fn execute_ai_tool(
        &self,
        provider: LlmProvider,
        ctx: &RunContext,
        node_id: &str,
    ) -> Result<Value, UpstreamServiceError> {
        tracing::debug!("🤖 Executing AI tool node: {}", node_id);
        let config: AiToolConfig = self.typed_config(ctx, node_id)?;

        let credential = require_credential(self.collaborators.credentials.as_ref(), &config.credential_id).await?;
        let api_key = credential.field("api_key_value")?.to_string();

        let system_prompt = if config.system_prompt.trim().is_empty() {
            DEFAULT_JSON_SYSTEM_PROMPT.to_string()
        } else {
            config.system_prompt.trim().to_string()
        };

        let request = LlmRequest {
            provider,
            model: config.model,
            system_prompt,
            user_prompt: config.prompt,
            api_key,
            json_mode: config.response_format.as_deref() != Some("text"),
        };

        let text = self.collaborators.llm.invoke(request).await?;
        Ok(parse_llm_output(&text))
    }

    async fn execute_http_tool(&self, ctx: &RunContext, node_id: &str) -> Result<Value, UpstreamServiceError> {
        tracing::debug!("🌐 Executing HTTP tool node: {}", node_id);
        let call: HttpCall = self.typed_config(ctx, node_id)?;
        self.send_call(call).await
    }

    async fn execute_mail_tool(&self, ctx: &RunContext, node_id: &str) -> Result<Value, UpstreamServiceError> {
        tracing::debug!("📧 Executing mail node: {}", node_id);
        let config = self.resolved_config(ctx, node_id)?;
        let call = build_mail_call(&config, &self.mail_endpoint)?;
        self.send_call(call).await
    }

    /// Attach auth, send, and interpret the response
    async fn send_call(&self, call: HttpCall) -> Result<Value, UpstreamServiceError> {
        let auth = match call.auth() {
            Some((auth_type, credential_id)) => {
                let credential = require_credential(self.collaborators.credentials.as_ref(), credential_id).await?;
                auth_header(&credential, auth_type)?
            }
            None => None,
        };

        let request = call.into_request(auth);
        let method = request.method.clone();
        let url = request.url.clone();

        let response = self.collaborators.http.send(request).await?;
        tracing::info!("✅ HTTP request completed: {} {} (status: {})", method, url, response.status);
        interpret_response(response)
    }

    fn execute_text_tool(&self, ctx: &RunContext, node_id: &str) -> Result<Value, UpstreamServiceError> {
        let config: TextToolConfig = self.typed_config(ctx, node_id)?;
        let output: Map<String, Value> = config
            .fields
            .into_iter()
            .filter(|f| !f.label.is_empty())
            .map(|f| (f.label, f.value))
            .collect();
        Ok(Value::Object(output))
    }

    async fn execute_sleep_tool(&self, ctx: &RunContext, node_id: &str) -> Result<Value, UpstreamServiceError> {
        let config: SleepConfig = self.typed_config(ctx, node_id)?;
        let duration = config.to_duration()?;
        tracing::debug!("😴 Sleeping {:?} in node {}", duration, node_id);
        tokio::time::sleep(duration).await;
        Ok(serde_json::json!({ "slept_ms": duration.as_millis() as u64 }))
    }
}
