//! The runtime dispatcher.
//!
//! [`AgentRuntime`] resolves an adapter from a provider identifier, layering
//! the caller's credentials over the server-wide defaults, and runs requests
//! through it.
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RuntimeConfig::from_env();
//!     let runtime = AgentRuntime::initialize("openai", &ClientCredentials::default(), &config);
//!
//!     let payload = ChatStreamPayload::new("gpt-4o", vec![ChatMessage::user("Hello!")]);
//!     let mut collected = CollectedResponse::default();
//!     runtime.stream(&payload, &mut collected).await;
//!
//!     println!("{}", collected.text);
//! }
//! ```

use futures::stream;
use tracing::debug;

use crate::classify::ErrorContext;
use crate::config::{ClientCredentials, RuntimeConfig};
use crate::error::ChatCompletionError;
use crate::llm::{
    AdapterResponse, AnthropicAdapter, AzureOpenAIAdapter, BedrockAdapter, ChatAdapter,
    GoogleAdapter, OllamaAdapter, OpenAICompatibleAdapter, ProviderConfig, ZhiPuAdapter,
};
use crate::messages::{ChatStreamPayload, CompletionResult};
use crate::stream::{
    completion_from, ChatStream, ChatStreamCallbacks, ChunkKind, StreamOutcome, StreamStack,
};
use crate::types::{ModelProvider, StreamId};

/// Builds the adapter serving `provider`.
///
/// Never fails and never touches the network.
#[must_use]
pub fn resolve_adapter(provider: ModelProvider, config: &ProviderConfig) -> Box<dyn ChatAdapter> {
    match provider {
        ModelProvider::Anthropic => Box::new(AnthropicAdapter::new(config)),
        ModelProvider::Azure => Box::new(AzureOpenAIAdapter::new(config)),
        ModelProvider::Bedrock => Box::new(BedrockAdapter::new(config)),
        ModelProvider::Google => Box::new(GoogleAdapter::new(config)),
        ModelProvider::Ollama => Box::new(OllamaAdapter::new(config)),
        ModelProvider::ZhiPu => Box::new(ZhiPuAdapter::new(config)),
        ModelProvider::Groq
        | ModelProvider::Mistral
        | ModelProvider::Moonshot
        | ModelProvider::OpenAI
        | ModelProvider::OpenRouter
        | ModelProvider::Perplexity
        | ModelProvider::TogetherAI
        | ModelProvider::ZeroOne => Box::new(OpenAICompatibleAdapter::new(provider, config)),
    }
}

/// The result of [`AgentRuntime::chat`].
#[derive(Debug)]
pub enum ChatResponse {
    /// Normalized stream, for streaming requests
    Stream(ChatStream),
    /// Normalized result, for non-streaming requests
    Completion(CompletionResult),
}

impl ChatResponse {
    /// Views the response as a stream; a completion replays as text, tool
    /// calls and stop chunks.
    #[must_use]
    pub fn into_stream(self) -> ChatStream {
        match self {
            Self::Stream(stream) => stream,
            Self::Completion(result) => {
                let id = StreamId::new();
                let stack = StreamStack::new(id.clone());
                let mut chunks = vec![stack.text(result.text)];
                if !result.tool_calls.is_empty() {
                    chunks.push(stack.chunk(ChunkKind::ToolCalls(result.tool_calls)));
                }
                if let Some(reason) = result.stop_reason {
                    chunks.push(stack.stop(reason));
                }
                ChatStream::from_chunks(id, stream::iter(chunks))
            }
        }
    }
}

/// A dispatcher bound to one provider for one caller.
pub struct AgentRuntime {
    label: String,
    adapter: Box<dyn ChatAdapter>,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("label", &self.label)
            .field("provider", &self.adapter.provider())
            .field("base_url", &self.adapter.base_url())
            .finish()
    }
}

impl AgentRuntime {
    /// Resolves the adapter for `provider_id`.
    ///
    /// Recognized identifiers (case-insensitive, plus the aliases
    /// `azureOpenAI` and `chatglm`) get their own adapter, configured from
    /// the server defaults with `credentials` layered on top. Any other
    /// identifier gets the OpenAI-compatible adapter, configured from
    /// `credentials` alone.
    ///
    /// Never fails: missing credentials surface from the first request.
    #[must_use]
    pub fn initialize(
        provider_id: &str,
        credentials: &ClientCredentials,
        config: &RuntimeConfig,
    ) -> Self {
        let adapter = match ModelProvider::parse(provider_id) {
            Some(provider) => {
                let settings = config.defaults_for(provider).overlay(credentials);
                debug!(provider = %provider, "resolved adapter");
                resolve_adapter(provider, &settings)
            }
            None => {
                debug!(
                    provider_id,
                    "unrecognized provider, falling back to OpenAI-compatible adapter"
                );
                let settings = ProviderConfig::new().overlay(credentials);
                resolve_adapter(ModelProvider::OpenAI, &settings)
            }
        };

        Self::from_adapter(provider_id, adapter)
    }

    /// Wraps an existing adapter; `label` is reported on errors.
    #[must_use]
    pub fn from_adapter(label: impl Into<String>, adapter: Box<dyn ChatAdapter>) -> Self {
        Self {
            label: label.into(),
            adapter,
        }
    }

    /// The provider whose adapter serves this runtime.
    #[must_use]
    pub fn provider(&self) -> ModelProvider {
        self.adapter.provider()
    }

    /// The identifier this runtime was initialized with.
    #[must_use]
    pub fn provider_label(&self) -> &str {
        &self.label
    }

    /// Base URL the adapter sends requests to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.adapter.base_url()
    }

    fn error_context(&self) -> ErrorContext {
        let base_url = self.adapter.base_url();
        let endpoint = (!base_url.is_empty()).then(|| base_url.to_string());
        ErrorContext::new(self.label.clone(), self.adapter.provider(), endpoint)
    }

    /// Issues one chat request.
    ///
    /// Returns a [`ChatStream`] when `payload.stream` is set, a
    /// [`CompletionResult`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns the classified error if the request could not be sent or the
    /// vendor refused it. Errors after the stream opened arrive as the
    /// stream's error chunk instead.
    pub async fn chat(
        &self,
        payload: &ChatStreamPayload,
    ) -> Result<ChatResponse, ChatCompletionError> {
        let context = self.error_context();

        match self.adapter.chat(payload).await {
            Ok(AdapterResponse::Stream(vendor)) => {
                Ok(ChatResponse::Stream(ChatStream::from_vendor(vendor, context)))
            }
            Ok(AdapterResponse::Completion { shape, body }) => completion_from(shape, &body)
                .map(ChatResponse::Completion)
                .map_err(|e| context.error(e)),
            Err(e) => {
                let error = context.error(e);
                debug!(provider = %self.label, kind = %error.kind, "chat request failed");
                Err(error)
            }
        }
    }

    /// Issues one chat request and drives its stream into `callbacks`.
    ///
    /// Exactly one of `on_completion` or `on_error` fires, including when
    /// the request fails before a stream exists (then `on_error` is the only
    /// hook called). Non-streaming payloads are replayed through the same
    /// hooks.
    pub async fn stream<C>(&self, payload: &ChatStreamPayload, callbacks: &mut C) -> StreamOutcome
    where
        C: ChatStreamCallbacks + ?Sized,
    {
        match self.chat(payload).await {
            Ok(response) => response.into_stream().drive(callbacks).await,
            Err(error) => {
                callbacks.on_error(&error);
                StreamOutcome::Failed(error)
            }
        }
    }
}
