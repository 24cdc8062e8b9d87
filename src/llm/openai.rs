//! OpenAI-compatible chat completions adapter.
//!
//! Serves OpenAI itself and every vendor exposing the same
//! `/chat/completions` API: Mistral, Moonshot, Perplexity, OpenRouter,
//! TogetherAI, ZeroOne and Groq. It is also the fallback for provider
//! identifiers the runtime does not recognize.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::client::{AdapterResponse, ChatAdapter};
use super::config::{default_base_url, ProviderConfig};
use super::error::ProviderError;
use super::http::{self, HttpClient};
use crate::messages::{ChatMessage, ChatStreamPayload, MessageRole, ToolDefinition};
use crate::stream::{ChunkShape, Framing};
use crate::types::ModelProvider;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_REFERER: &str = "https://crates.io/crates/agent-runtime";
const OPENROUTER_TITLE: &str = "agent-runtime";

/// Request body for the chat completions API.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    stream: bool,
}

/// A message in OpenAI format.
#[derive(Debug, Clone, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// A tool definition in OpenAI format.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Maps the canonical payload onto the OpenAI schema.
    pub(crate) fn from_payload(payload: &'a ChatStreamPayload) -> Self {
        Self {
            model: &payload.model,
            messages: payload.messages.iter().map(convert_message).collect(),
            tools: payload.tools.as_deref().map(convert_tools),
            temperature: payload.temperature,
            top_p: payload.top_p,
            max_tokens: payload.max_tokens,
            frequency_penalty: payload.frequency_penalty,
            presence_penalty: payload.presence_penalty,
            stream: payload.stream,
        }
    }

    /// Drops the model field, for APIs that take it from the URL.
    pub(crate) fn without_model(mut self) -> Self {
        self.model = "";
        self
    }
}

fn convert_message(message: &ChatMessage) -> OpenAIMessage {
    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| OpenAIToolCall {
                id: call.id.clone(),
                call_type: "function",
                function: OpenAIFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            })
            .collect()
    });

    // Assistant turns that only call tools carry no content.
    let content = if message.role == MessageRole::Assistant
        && message.content.is_empty()
        && tool_calls.is_some()
    {
        None
    } else {
        Some(message.content.clone())
    };

    OpenAIMessage {
        role: message.role.as_str(),
        content,
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Converts tool definitions to OpenAI API format.
pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAITool> {
    tools
        .iter()
        .map(|t| OpenAITool {
            tool_type: "function",
            function: OpenAIFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Adapter for OpenAI-compatible APIs.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleAdapter {
    provider: ModelProvider,
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    headers: Vec<(&'static str, String)>,
}

impl OpenAICompatibleAdapter {
    /// Creates an adapter for `provider`, using the vendor's public endpoint
    /// unless the config overrides it.
    #[must_use]
    pub fn new(provider: ModelProvider, config: &ProviderConfig) -> Self {
        let fallback = default_base_url(provider).unwrap_or(OPENAI_BASE_URL);

        let mut headers = Vec::new();
        if provider == ModelProvider::OpenRouter {
            headers.push(("HTTP-Referer", OPENROUTER_REFERER.to_string()));
            headers.push(("X-Title", OPENROUTER_TITLE.to_string()));
        }

        Self {
            provider,
            http: HttpClient::new(config.timeout),
            base_url: config.base_url_or(fallback),
            api_key: config.api_key().map(str::to_string),
            headers,
        }
    }

    /// Creates an adapter for OpenAI.
    #[must_use]
    pub fn openai(config: &ProviderConfig) -> Self {
        Self::new(ModelProvider::OpenAI, config)
    }

    /// Returns the chat completions endpoint URL.
    fn chat_completions_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Sends the request with `bearer` as the credential.
    pub(crate) async fn chat_with_bearer(
        &self,
        payload: &ChatStreamPayload,
        bearer: Option<&str>,
    ) -> Result<AdapterResponse, ProviderError> {
        let url = self.chat_completions_endpoint();
        debug!(provider = %self.provider, %url, model = %payload.model, stream = payload.stream, "sending chat request");

        let mut request = self
            .http
            .post(&url, payload.stream)?
            .json(&ChatCompletionRequest::from_payload(payload));

        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        let response = http::send(request).await?;
        http::respond(response, payload.stream, Framing::Sse, ChunkShape::OpenAI).await
    }
}

#[async_trait]
impl ChatAdapter for OpenAICompatibleAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        self.chat_with_bearer(payload, self.api_key.as_deref()).await
    }

    fn provider(&self) -> ModelProvider {
        self.provider
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
