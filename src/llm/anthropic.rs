//! Anthropic Messages API adapter.
//!
//! The request body built here is also what Bedrock expects for Claude
//! models, minus `model` and `stream` and with a Bedrock version marker.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::client::{AdapterResponse, ChatAdapter};
use super::config::{default_base_url, ProviderConfig};
use super::error::ProviderError;
use super::http::{self, HttpClient};
use crate::messages::{ChatMessage, ChatStreamPayload, MessageRole, ToolDefinition};
use crate::stream::{ChunkShape, Framing};
use crate::types::ModelProvider;

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Version marker Bedrock requires in Claude request bodies.
pub const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// `max_tokens` is mandatory for the Messages API.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request body for the Anthropic messages API.
#[derive(Debug, Clone, Serialize)]
struct MessagesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anthropic_version: Option<&'static str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// A message in the API format.
#[derive(Debug, Clone, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

/// A content block in the API format.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Tool definition in the API format.
#[derive(Debug, Clone, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

/// Target the request body is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyTarget {
    /// The Anthropic API itself
    Direct,
    /// Bedrock `invoke` for a Claude model
    Bedrock,
}

/// Builds the Messages API request body for `payload`.
///
/// # Errors
///
/// Returns a parse error if the body cannot be encoded.
pub(crate) fn request_body(
    payload: &ChatStreamPayload,
    target: BodyTarget,
) -> Result<Value, ProviderError> {
    let direct = target == BodyTarget::Direct;
    let request = MessagesRequest {
        model: direct.then(|| payload.model.clone()),
        anthropic_version: (!direct).then_some(BEDROCK_ANTHROPIC_VERSION),
        max_tokens: payload.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: payload.system_prompt(),
        messages: convert_messages(payload.conversation()),
        tools: payload
            .has_tools()
            .then(|| payload.tools.as_deref().map(convert_tools))
            .flatten(),
        temperature: payload.temperature,
        top_p: payload.top_p,
        stream: direct.then_some(payload.stream),
    };
    serde_json::to_value(request)
        .map_err(|e| ProviderError::parse(format!("failed to encode request: {}", e)))
}

/// Converts conversation messages to Anthropic blocks.
///
/// Tool results travel as user turns, and the API rejects two consecutive
/// turns from the same role, so adjacent same-role turns are merged.
fn convert_messages<'a>(messages: impl Iterator<Item = &'a ChatMessage>) -> Vec<ApiMessage> {
    let mut api_messages: Vec<ApiMessage> = Vec::new();

    for msg in messages {
        let (role, blocks) = match msg.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", text_block(&msg.content).into_iter().collect()),
            MessageRole::Assistant => {
                let mut blocks: Vec<ContentBlock> = text_block(&msg.content).into_iter().collect();
                if let Some(tool_calls) = &msg.tool_calls {
                    blocks.extend(tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: tc.arguments.clone(),
                    }));
                }
                ("assistant", blocks)
            }
            MessageRole::Tool => {
                let Some(tool_call_id) = &msg.tool_call_id else {
                    continue;
                };
                (
                    "user",
                    vec![ContentBlock::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: msg.content.clone(),
                    }],
                )
            }
        };

        if blocks.is_empty() {
            continue;
        }
        match api_messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => api_messages.push(ApiMessage {
                role,
                content: blocks,
            }),
        }
    }

    api_messages
}

fn text_block(text: &str) -> Option<ContentBlock> {
    (!text.is_empty()).then(|| ContentBlock::Text {
        text: text.to_string(),
    })
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
    tools
        .iter()
        .map(|t| ApiTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        })
        .collect()
}

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    version: String,
}

impl AnthropicAdapter {
    /// Creates an adapter from `config`.
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        let fallback = default_base_url(ModelProvider::Anthropic).unwrap_or_default();
        Self {
            http: HttpClient::new(config.timeout),
            base_url: config.base_url_or(fallback),
            api_key: config.api_key().map(str::to_string),
            version: config
                .api_version
                .clone()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| ANTHROPIC_VERSION.to_string()),
        }
    }
}

#[async_trait]
impl ChatAdapter for AnthropicAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::invalid_credentials("Anthropic requires an API key"))?;

        let url = format!("{}/v1/messages", self.base_url);
        debug!(%url, model = %payload.model, stream = payload.stream, "sending Anthropic request");

        let request = self
            .http
            .post(&url, payload.stream)?
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.version)
            .json(&request_body(payload, BodyTarget::Direct)?);

        let response = http::send(request).await?;
        http::respond(response, payload.stream, Framing::Sse, ChunkShape::Anthropic).await
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Anthropic
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
