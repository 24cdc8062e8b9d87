//! Azure OpenAI adapter.
//!
//! Azure serves the OpenAI chat schema from per-resource endpoints, keyed by
//! deployment name instead of model name.

use async_trait::async_trait;
use tracing::debug;

use super::client::{AdapterResponse, ChatAdapter};
use super::config::{ProviderConfig, DEFAULT_AZURE_API_VERSION};
use super::error::ProviderError;
use super::http::{self, HttpClient};
use super::openai::ChatCompletionRequest;
use crate::messages::ChatStreamPayload;
use crate::stream::{ChunkShape, Framing};
use crate::types::ModelProvider;

/// Adapter for Azure OpenAI deployments.
#[derive(Debug, Clone)]
pub struct AzureOpenAIAdapter {
    http: HttpClient,
    endpoint: String,
    api_key: Option<String>,
    api_version: String,
}

impl AzureOpenAIAdapter {
    /// Creates an adapter for the resource at `config.base_url`.
    ///
    /// A missing endpoint is reported by [`ChatAdapter::chat`].
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http: HttpClient::new(config.timeout),
            endpoint: config.base_url_or(""),
            api_key: config.api_key().map(str::to_string),
            api_version: config
                .api_version
                .clone()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        }
    }

    fn deployment_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint,
            urlencoding::encode(deployment),
            urlencoding::encode(&self.api_version)
        )
    }
}

#[async_trait]
impl ChatAdapter for AzureOpenAIAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        if self.endpoint.is_empty() {
            return Err(ProviderError::invalid_credentials(
                "Azure OpenAI requires an endpoint",
            ));
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::invalid_credentials("Azure OpenAI requires an API key"))?;

        let url = self.deployment_url(&payload.model);
        debug!(%url, stream = payload.stream, "sending Azure chat request");

        let request = self
            .http
            .post(&url, payload.stream)?
            .header("api-key", api_key)
            .json(&ChatCompletionRequest::from_payload(payload).without_model());

        let response = http::send(request).await?;
        http::respond(response, payload.stream, Framing::Sse, ChunkShape::OpenAI).await
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Azure
    }

    fn base_url(&self) -> &str {
        &self.endpoint
    }
}
