//! AWS Bedrock runtime adapter.
//!
//! Bedrock hosts several model families behind one `invoke` API. The family
//! decides the request body and the chunk shape inside the event stream;
//! it is detected from the model id.

mod sigv4;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::anthropic::{self, BodyTarget};
use super::client::{AdapterResponse, ChatAdapter};
use super::config::{ProviderConfig, DEFAULT_AWS_REGION};
use super::error::ProviderError;
use super::http::{self, HttpClient};
use super::openai::ChatCompletionRequest;
use crate::messages::{ChatStreamPayload, MessageRole};
use crate::stream::{ChunkShape, Framing};
use crate::types::ModelProvider;

use sigv4::{AwsCredentials, Signer};

const SERVICE: &str = "bedrock";
const CROSS_REGION_PREFIXES: &[&str] = &["us.", "eu.", "apac."];

/// Model families served through Bedrock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BedrockFamily {
    /// Anthropic Claude (`anthropic.*`)
    Anthropic,
    /// Mistral chat models (`mistral.*`)
    Mistral,
    /// Meta Llama (`meta.*`)
    Llama,
}

impl BedrockFamily {
    /// Detects the family of `model_id`, ignoring a cross-region
    /// inference-profile prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use agent_runtime::llm::BedrockFamily;
    ///
    /// assert_eq!(
    ///     BedrockFamily::detect("us.anthropic.claude-3-5-sonnet-20240620-v1:0"),
    ///     Some(BedrockFamily::Anthropic)
    /// );
    /// assert_eq!(BedrockFamily::detect("amazon.titan-text-express-v1"), None);
    /// ```
    #[must_use]
    pub fn detect(model_id: &str) -> Option<Self> {
        let id = CROSS_REGION_PREFIXES
            .iter()
            .find_map(|prefix| model_id.strip_prefix(prefix))
            .unwrap_or(model_id);

        if id.starts_with("anthropic.") {
            Some(Self::Anthropic)
        } else if id.starts_with("mistral.") {
            Some(Self::Mistral)
        } else if id.starts_with("meta.") {
            Some(Self::Llama)
        } else {
            None
        }
    }

    /// Shape of the JSON chunks this family streams.
    #[must_use]
    pub fn shape(self) -> ChunkShape {
        match self {
            Self::Anthropic => ChunkShape::BedrockAnthropic,
            Self::Mistral => ChunkShape::BedrockMistral,
            Self::Llama => ChunkShape::BedrockLlama,
        }
    }

    /// Builds the `invoke` body for `payload`.
    fn request_body(self, payload: &ChatStreamPayload) -> Result<Value, ProviderError> {
        match self {
            Self::Anthropic => anthropic::request_body(payload, BodyTarget::Bedrock),
            Self::Mistral => {
                let mut body =
                    serde_json::to_value(ChatCompletionRequest::from_payload(payload).without_model())
                        .map_err(|e| {
                            ProviderError::parse(format!("failed to encode request: {}", e))
                        })?;
                if let Some(object) = body.as_object_mut() {
                    object.remove("stream");
                    object.remove("frequency_penalty");
                    object.remove("presence_penalty");
                }
                Ok(body)
            }
            Self::Llama => {
                let mut body = json!({ "prompt": llama_prompt(payload) });
                if let Some(object) = body.as_object_mut() {
                    if let Some(max) = payload.max_tokens {
                        object.insert("max_gen_len".to_string(), json!(max));
                    }
                    if let Some(temperature) = payload.temperature {
                        object.insert("temperature".to_string(), json!(temperature));
                    }
                    if let Some(top_p) = payload.top_p {
                        object.insert("top_p".to_string(), json!(top_p));
                    }
                }
                Ok(body)
            }
        }
    }
}

/// Renders the conversation with the Llama 3 chat template, ending with an
/// open assistant header.
fn llama_prompt(payload: &ChatStreamPayload) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    for message in &payload.messages {
        let role = match message.role {
            MessageRole::Tool => "ipython",
            role => role.as_str(),
        };
        prompt.push_str(&format!(
            "<|start_header_id|>{}<|end_header_id|>\n\n{}<|eot_id|>",
            role, message.content
        ));
    }
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}

/// Adapter for the Bedrock runtime API.
#[derive(Debug, Clone)]
pub struct BedrockAdapter {
    http: HttpClient,
    base_url: String,
    region: String,
    credentials: Option<AwsCredentials>,
}

impl BedrockAdapter {
    /// Creates an adapter from `config`.
    ///
    /// The endpoint is derived from the region unless `base_url` overrides
    /// it. Missing keys are reported by [`ChatAdapter::chat`].
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        let region = config
            .region
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());
        let fallback = format!("https://bedrock-runtime.{}.amazonaws.com", region);

        let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        let credentials = match (present(&config.access_key_id), present(&config.secret_access_key)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: present(&config.session_token),
            }),
            _ => None,
        };

        Self {
            http: HttpClient::new(config.timeout),
            base_url: config.base_url_or(&fallback),
            region,
            credentials,
        }
    }

    /// The region requests are signed for.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    fn invoke_path(model: &str, streaming: bool) -> String {
        let action = if streaming {
            "invoke-with-response-stream"
        } else {
            "invoke"
        };
        format!("/model/{}/{}", urlencoding::encode(model), action)
    }
}

#[async_trait]
impl ChatAdapter for BedrockAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ProviderError::invalid_credentials("Bedrock requires an AWS access key id and secret")
        })?;
        let family = BedrockFamily::detect(&payload.model)
            .ok_or_else(|| ProviderError::unsupported_model(&payload.model))?;

        let base = url::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::network(format!("invalid Bedrock endpoint: {}", e)))?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ProviderError::network(format!(
                    "invalid Bedrock endpoint: {}",
                    self.base_url
                )))
            }
        };

        let path = format!(
            "{}{}",
            base.path().trim_end_matches('/'),
            Self::invoke_path(&payload.model, payload.stream)
        );
        let body = serde_json::to_vec(&family.request_body(payload)?)
            .map_err(|e| ProviderError::parse(format!("failed to encode request: {}", e)))?;

        let signer = Signer {
            credentials,
            region: &self.region,
            service: SERVICE,
        };
        let signed = signer.sign_json_post(&host, &path, &body, chrono::Utc::now())?;

        let url = format!("{}{}", self.base_url, Self::invoke_path(&payload.model, payload.stream));
        debug!(%url, ?family, stream = payload.stream, "sending Bedrock request");

        let mut request = self
            .http
            .post(&url, payload.stream)?
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization)
            .body(body);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }
        if payload.stream {
            request = request.header("accept", "application/vnd.amazon.eventstream");
        }

        let response = http::send(request).await?;
        http::respond(response, payload.stream, Framing::AwsEventStream, family.shape()).await
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Bedrock
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::ProviderErrorKind;
    use crate::messages::ChatMessage;

    #[test]
    fn detects_families_with_cross_region_prefix() {
        assert_eq!(
            BedrockFamily::detect("anthropic.claude-3-haiku-20240307-v1:0"),
            Some(BedrockFamily::Anthropic)
        );
        assert_eq!(
            BedrockFamily::detect("eu.mistral.mistral-large-2407-v1:0"),
            Some(BedrockFamily::Mistral)
        );
        assert_eq!(
            BedrockFamily::detect("apac.meta.llama3-70b-instruct-v1:0"),
            Some(BedrockFamily::Llama)
        );
        assert_eq!(BedrockFamily::detect("cohere.command-r-v1:0"), None);
    }

    #[test]
    fn endpoint_follows_region() {
        let adapter = BedrockAdapter::new(&ProviderConfig::new().with_region("eu-central-1"));
        assert_eq!(adapter.base_url(), "https://bedrock-runtime.eu-central-1.amazonaws.com");

        let adapter = BedrockAdapter::new(&ProviderConfig::new());
        assert_eq!(adapter.region(), "us-east-1");
    }

    #[test]
    fn invoke_path_encodes_model_id() {
        assert_eq!(
            BedrockAdapter::invoke_path("anthropic.claude-3-sonnet-20240229-v1:0", true),
            "/model/anthropic.claude-3-sonnet-20240229-v1%3A0/invoke-with-response-stream"
        );
        assert!(BedrockAdapter::invoke_path("meta.llama3", false).ends_with("/invoke"));
    }

    #[test]
    fn mistral_body_is_openai_style_without_stream() {
        let payload = ChatStreamPayload::new("mistral.mistral-large-2407-v1:0", vec![ChatMessage::user("Hi")])
            .with_max_tokens(256);
        let body = BedrockFamily::Mistral.request_body(&payload).unwrap();

        assert_eq!(body["messages"][0]["content"], "Hi");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("stream").is_none());
        assert!(body.get("model").is_none());
    }

    #[test]
    fn llama_prompt_template() {
        let payload = ChatStreamPayload::new(
            "meta.llama3-8b-instruct-v1:0",
            vec![ChatMessage::system("Be kind."), ChatMessage::user("Hi")],
        )
        .with_max_tokens(64);
        let body = BedrockFamily::Llama.request_body(&payload).unwrap();

        assert_eq!(
            body["prompt"],
            "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\nBe kind.<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>\n\nHi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
        assert_eq!(body["max_gen_len"], 64);
    }

    #[tokio::test]
    async fn missing_keys_fail_at_call_time() {
        let adapter = BedrockAdapter::new(&ProviderConfig::new());
        let payload = ChatStreamPayload::new("anthropic.claude-3", vec![ChatMessage::user("Hi")]);

        let error = adapter.chat(&payload).await.unwrap_err();
        assert!(matches!(error.kind, ProviderErrorKind::InvalidCredentials { .. }));
    }

    #[tokio::test]
    async fn unknown_family_is_unsupported_model() {
        let adapter = BedrockAdapter::new(&ProviderConfig::new().with_aws_keys("AKID", "SECRET"));
        let payload = ChatStreamPayload::new("amazon.titan-text-express-v1", vec![ChatMessage::user("Hi")]);

        let error = adapter.chat(&payload).await.unwrap_err();
        assert_eq!(error.kind, ProviderErrorKind::UnsupportedModel {
            model: "amazon.titan-text-express-v1".to_string()
        });
    }
}
