//! Ollama adapter (`/api/chat`).
//!
//! Ollama streams newline-delimited JSON rather than SSE and takes no
//! credentials.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::client::{AdapterResponse, ChatAdapter};
use super::config::{default_base_url, ProviderConfig};
use super::error::ProviderError;
use super::http::{self, HttpClient};
use crate::messages::{ChatMessage, ChatStreamPayload, ToolDefinition};
use crate::stream::{ChunkShape, Framing};
use crate::types::ModelProvider;

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

impl<'a> OllamaChatRequest<'a> {
    fn from_payload(payload: &'a ChatStreamPayload) -> Self {
        let options = OllamaOptions {
            temperature: payload.temperature,
            top_p: payload.top_p,
            num_predict: payload.max_tokens,
            frequency_penalty: payload.frequency_penalty,
            presence_penalty: payload.presence_penalty,
        };
        let has_options = options.temperature.is_some()
            || options.top_p.is_some()
            || options.num_predict.is_some()
            || options.frequency_penalty.is_some()
            || options.presence_penalty.is_some();

        Self {
            model: &payload.model,
            messages: payload.messages.iter().map(convert_message).collect(),
            tools: payload
                .has_tools()
                .then(|| payload.tools.as_deref().map(convert_tools))
                .flatten(),
            options: has_options.then_some(options),
            stream: payload.stream,
        }
    }
}

fn convert_message(message: &ChatMessage) -> OllamaMessage {
    OllamaMessage {
        role: message.role.as_str(),
        content: message.content.clone(),
        tool_calls: message
            .tool_calls
            .iter()
            .flatten()
            .map(|call| {
                serde_json::json!({
                    "function": { "name": call.name, "arguments": call.arguments }
                })
            })
            .collect(),
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

/// Adapter for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    http: HttpClient,
    base_url: String,
}

impl OllamaAdapter {
    /// Creates an adapter from `config`; only the base URL and timeout apply.
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        let fallback = default_base_url(ModelProvider::Ollama).unwrap_or_default();
        Self {
            http: HttpClient::new(config.timeout),
            base_url: config.base_url_or(fallback),
        }
    }
}

#[async_trait]
impl ChatAdapter for OllamaAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(%url, model = %payload.model, stream = payload.stream, "sending Ollama request");

        let request = self
            .http
            .post(&url, payload.stream)?
            .json(&OllamaChatRequest::from_payload(payload));

        let response = http::send(request).await?;
        http::respond(response, payload.stream, Framing::JsonLines, ChunkShape::Ollama).await
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Ollama
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCall;
    use serde_json::json;

    #[test]
    fn default_base_url_is_local() {
        let adapter = OllamaAdapter::new(&ProviderConfig::new());
        assert_eq!(adapter.base_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn sampling_moves_into_options() {
        let payload = ChatStreamPayload::new("llama3", vec![ChatMessage::user("Hi")])
            .with_max_tokens(32)
            .with_top_p(0.5);
        let json = serde_json::to_value(OllamaChatRequest::from_payload(&payload)).unwrap();

        assert_eq!(json["options"]["num_predict"], 32);
        assert_eq!(json["options"]["top_p"], 0.5);
        assert!(json["options"].get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn no_options_when_unset() {
        let payload = ChatStreamPayload::new("llama3", vec![ChatMessage::user("Hi")]).with_stream(false);
        let json = serde_json::to_value(OllamaChatRequest::from_payload(&payload)).unwrap();
        assert!(json.get("options").is_none());
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0], json!({"role": "user", "content": "Hi"}));
    }

    #[test]
    fn tool_calls_keep_object_arguments() {
        let payload = ChatStreamPayload::new(
            "llama3",
            vec![ChatMessage::assistant_with_tools(
                "",
                vec![ToolCall {
                    id: "1".to_string(),
                    name: "add".to_string(),
                    arguments: json!({"a": 1}),
                }],
            )],
        );
        let json = serde_json::to_value(OllamaChatRequest::from_payload(&payload)).unwrap();
        assert_eq!(
            json["messages"][0]["tool_calls"][0]["function"]["arguments"],
            json!({"a": 1})
        );
    }
}
