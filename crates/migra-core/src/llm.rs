//! HTTP chat-completions oracle
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. Both
//! supported vendors are reached this way: OpenAI directly and Google
//! through the Gemini OpenAI-compatibility endpoint.
//!
//! Transcript mapping for the agent whose turn it is:
//! - its own replies become `assistant` messages (with their tool calls)
//! - results of its own tool calls become `tool` messages
//! - everything else becomes a `user` message prefixed with the speaker

use crate::error::{ConfigError, OracleError};
use crate::oracle::{OracleReply, OracleRequest, ReasoningOracle};
use crate::types::ToolCall;
use async_trait::async_trait;
use migra_gateway::OperationSpec;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

/// Supported model vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    OpenAi,
    Google,
}

impl Vendor {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }
}

/// Parsed `"<vendor>/<model>"` provider string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub vendor: Vendor,
    pub model: String,
}

impl FromStr for ProviderSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || ConfigError::UnsupportedProvider(s.to_string());
        let (vendor, model) = s.split_once('/').ok_or_else(unsupported)?;
        let vendor = match vendor {
            "openai" => Vendor::OpenAi,
            "google" => Vendor::Google,
            _ => return Err(unsupported()),
        };
        if model.trim().is_empty() {
            return Err(unsupported());
        }
        Ok(Self {
            vendor,
            model: model.to_string(),
        })
    }
}

impl std::fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.vendor.as_str(), self.model)
    }
}

/// Chat-completions client implementing [`ReasoningOracle`]
pub struct ChatCompletionsOracle {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for ChatCompletionsOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsOracle")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsOracle {
    /// Build a client for `provider` at `base_url` (without `/chat/completions`)
    pub fn new(
        provider: &ProviderSpec,
        api_key: impl Into<String>,
        base_url: &str,
        temperature: f32,
    ) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("migra/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: provider.model.clone(),
            temperature,
        })
    }

    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request body for one turn
    #[must_use]
    pub fn build_payload(&self, request: &OracleRequest<'_>) -> Value {
        let mut payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": render_messages(request),
        });
        let tools = render_tools(request.operations);
        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools);
        }
        payload
    }
}

#[async_trait]
impl ReasoningOracle for ChatCompletionsOracle {
    async fn complete(&self, request: OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        let payload = self.build_payload(&request);
        tracing::debug!(
            agent = request.agent,
            model = %self.model,
            messages = request.transcript.len(),
            "oracle_request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let reply = parse_completion(&body)?;
        tracing::debug!(
            agent = request.agent,
            tool_calls = reply.tool_calls.len(),
            "oracle_reply"
        );
        Ok(reply)
    }
}

/// Chat messages for the agent whose turn it is
#[must_use]
pub fn render_messages(request: &OracleRequest<'_>) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.transcript.len() + 1);
    messages.push(json!({"role": "system", "content": request.directive}));

    for message in request.transcript {
        let own = message.speaker == request.agent;
        match (&message.tool_result, own) {
            (Some(result), true) => messages.push(json!({
                "role": "tool",
                "tool_call_id": result.call_id,
                "content": message.content,
            })),
            (Some(result), false) => messages.push(json!({
                "role": "user",
                "content": format!("[{} -> {}]: {}", message.speaker, result.operation, message.content),
            })),
            (None, true) => {
                let mut entry = json!({"role": "assistant", "content": message.content});
                if !message.tool_calls.is_empty() {
                    if message.content.is_empty() {
                        entry["content"] = Value::Null;
                    }
                    entry["tool_calls"] = message.tool_calls.iter().map(render_call).collect();
                }
                messages.push(entry);
            }
            (None, false) => messages.push(json!({
                "role": "user",
                "content": format!("[{}]: {}", message.speaker, message.content),
            })),
        }
    }
    messages
}

fn render_call(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.operation,
            "arguments": call.arguments.to_string(),
        },
    })
}

/// Function-tool declarations for the authorized operations
#[must_use]
pub fn render_tools(operations: &[OperationSpec]) -> Vec<Value> {
    operations
        .iter()
        .map(|op| {
            json!({
                "type": "function",
                "function": {
                    "name": op.name,
                    "description": op.description,
                    "parameters": op.input_schema,
                },
            })
        })
        .collect()
}

/// Extract the reply from a chat-completions response body.
///
/// Arguments that are not valid JSON are passed through as a string so the
/// gateway reports them as invalid rather than the session failing.
pub fn parse_completion(body: &Value) -> Result<OracleReply, OracleError> {
    let message = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or(OracleError::EmptyResponse)?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| OracleError::Decode("tool call without id".to_string()))?;
            let function = call
                .get("function")
                .ok_or_else(|| OracleError::Decode(format!("tool call {id} without function")))?;
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| OracleError::Decode(format!("tool call {id} without name")))?;
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) if raw.trim().is_empty() => Value::Null,
                Some(Value::String(raw)) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                Some(other) => other.clone(),
                None => Value::Null,
            };
            tool_calls.push(ToolCall::new(name, arguments).with_id(id));
        }
    }

    Ok(OracleReply { content, tool_calls })
}
