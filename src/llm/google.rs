//! Google Gemini adapter (`generativelanguage` v1beta).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use super::client::{AdapterResponse, ChatAdapter};
use super::config::{default_base_url, ProviderConfig};
use super::error::ProviderError;
use super::http::{self, HttpClient};
use crate::messages::{ChatMessage, ChatStreamPayload, MessageRole, ToolDefinition};
use crate::stream::{ChunkShape, Framing};
use crate::types::ModelProvider;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tools>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

impl GenerationConfig {
    fn from_payload(payload: &ChatStreamPayload) -> Option<Self> {
        let config = Self {
            temperature: payload.temperature,
            top_p: payload.top_p,
            max_output_tokens: payload.max_tokens,
            frequency_penalty: payload.frequency_penalty,
            presence_penalty: payload.presence_penalty,
        };
        let empty = config.temperature.is_none()
            && config.top_p.is_none()
            && config.max_output_tokens.is_none()
            && config.frequency_penalty.is_none()
            && config.presence_penalty.is_none();
        (!empty).then_some(config)
    }
}

fn request_body(payload: &ChatStreamPayload) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: convert_messages(payload.conversation()),
        system_instruction: payload.system_prompt().map(|text| Content {
            role: None,
            parts: vec![json!({ "text": text })],
        }),
        tools: payload
            .has_tools()
            .then(|| payload.tools.as_deref().map(convert_tools))
            .flatten(),
        generation_config: GenerationConfig::from_payload(payload),
    }
}

/// Converts conversation messages to Gemini contents.
///
/// Function responses must carry the function's name, which OpenAI-style
/// history only records on the assistant turn that made the call.
fn convert_messages<'a>(messages: impl Iterator<Item = &'a ChatMessage>) -> Vec<Content> {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut contents: Vec<Content> = Vec::new();

    for msg in messages {
        let (role, parts) = match msg.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", vec![json!({ "text": msg.content })]),
            MessageRole::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(json!({ "text": msg.content }));
                }
                for call in msg.tool_calls.iter().flatten() {
                    call_names.insert(&call.id, &call.name);
                    parts.push(json!({
                        "functionCall": { "name": call.name, "args": call.arguments }
                    }));
                }
                ("model", parts)
            }
            MessageRole::Tool => {
                let name = msg
                    .name
                    .as_deref()
                    .or_else(|| {
                        msg.tool_call_id
                            .as_deref()
                            .and_then(|id| call_names.get(id).copied())
                    })
                    .unwrap_or_default();
                let response = serde_json::from_str::<Value>(&msg.content)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| json!({ "content": msg.content }));
                (
                    "user",
                    vec![json!({
                        "functionResponse": { "name": name, "response": response }
                    })],
                )
            }
        };

        if parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some(last) if last.role == Some(role) => last.parts.extend(parts),
            _ => contents.push(Content {
                role: Some(role),
                parts,
            }),
        }
    }

    contents
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Tools> {
    vec![Tools {
        function_declarations: tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect(),
    }]
}

/// Adapter for Google Gemini.
#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleAdapter {
    /// Creates an adapter from `config`.
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        let fallback = default_base_url(ModelProvider::Google).unwrap_or_default();
        Self {
            http: HttpClient::new(config.timeout),
            base_url: config.base_url_or(fallback),
            api_key: config.api_key().map(str::to_string),
        }
    }

    fn endpoint(&self, model: &str, streaming: bool) -> String {
        let method = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        format!(
            "{}/v1beta/models/{}:{}",
            self.base_url,
            urlencoding::encode(model),
            method
        )
    }
}

#[async_trait]
impl ChatAdapter for GoogleAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::invalid_credentials("Gemini requires an API key"))?;

        let url = self.endpoint(&payload.model, payload.stream);
        debug!(%url, stream = payload.stream, "sending Gemini request");

        let request = self
            .http
            .post(&url, payload.stream)?
            .header("x-goog-api-key", api_key)
            .json(&request_body(payload));

        let response = http::send(request).await?;
        http::respond(response, payload.stream, Framing::Sse, ChunkShape::Google).await
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Google
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCall;

    fn body(payload: &ChatStreamPayload) -> Value {
        serde_json::to_value(request_body(payload)).unwrap()
    }

    #[test]
    fn endpoint_switches_on_stream_flag() {
        let adapter = GoogleAdapter::new(&ProviderConfig::with_key("k"));
        assert_eq!(
            adapter.endpoint("gemini-1.5-pro", true),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:streamGenerateContent?alt=sse"
        );
        assert!(adapter
            .endpoint("gemini-1.5-pro", false)
            .ends_with(":generateContent"));
    }

    #[test]
    fn roles_and_system_instruction() {
        let payload = ChatStreamPayload::new(
            "gemini-1.5-pro",
            vec![
                ChatMessage::system("Be terse."),
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello"),
            ],
        )
        .with_temperature(0.2);

        let json = body(&payload);
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "Hello");
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn function_response_takes_name_from_call() {
        let payload = ChatStreamPayload::new(
            "gemini-1.5-pro",
            vec![
                ChatMessage::user("Weather?"),
                ChatMessage::assistant_with_tools(
                    "",
                    vec![ToolCall {
                        id: "call_9".to_string(),
                        name: "get_weather".to_string(),
                        arguments: json!({"city": "Oslo"}),
                    }],
                ),
                ChatMessage::tool("call_9", "{\"temp\": 3}"),
            ],
        );

        let json = body(&payload);
        let call = &json["contents"][1]["parts"][0]["functionCall"];
        assert_eq!(call["name"], "get_weather");
        assert_eq!(call["args"], json!({"city": "Oslo"}));

        let response = &json["contents"][2]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "get_weather");
        assert_eq!(response["response"], json!({"temp": 3}));
    }

    #[test]
    fn plain_text_tool_output_is_wrapped() {
        let payload = ChatStreamPayload::new(
            "gemini",
            vec![ChatMessage::tool("x", "sunny").with_name("get_weather")],
        );
        let json = body(&payload);
        let response = &json["contents"][0]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "get_weather");
        assert_eq!(response["response"], json!({"content": "sunny"}));
    }

    #[test]
    fn declarations_and_no_empty_generation_config() {
        let payload = ChatStreamPayload::new("gemini", vec![ChatMessage::user("Hi")]).with_tools(vec![
            ToolDefinition {
                name: "lookup".to_string(),
                description: "Look up".to_string(),
                input_schema: json!({"type": "object"}),
            },
        ]);
        let json = body(&payload);
        assert_eq!(json["tools"][0]["functionDeclarations"][0]["name"], "lookup");
        assert!(json.get("generationConfig").is_none());
        assert!(json.get("systemInstruction").is_none());
    }
}
