//! Per-adapter provider configuration.
//!
//! A `ProviderConfig` is the bag of optional settings an adapter is built
//! from. Every field is optional: adapters construct from whatever is present
//! and only fail when a call actually needs a missing value.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ClientCredentials;
use crate::types::ModelProvider;

/// Default request timeout for hosted providers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Default AWS region for Bedrock.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Configuration for one provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// API version (Azure query parameter, Anthropic header)
    #[serde(default)]
    pub api_version: Option<String>,
    /// Cloud region (Bedrock)
    #[serde(default)]
    pub region: Option<String>,
    /// AWS access key id (Bedrock)
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// AWS secret access key (Bedrock)
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// AWS session token for temporary credentials (Bedrock)
    #[serde(default)]
    pub session_token: Option<String>,
    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            api_version: None,
            region: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration holding only an API key.
    ///
    /// # Examples
    ///
    /// ```
    /// use agent_runtime::llm::ProviderConfig;
    ///
    /// let config = ProviderConfig::with_key("sk-...");
    /// assert_eq!(config.api_key.as_deref(), Some("sk-..."));
    /// ```
    #[must_use]
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self::default().with_api_key(api_key)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL for the API.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API version.
    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Sets the cloud region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the AWS access key pair.
    #[must_use]
    pub fn with_aws_keys(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Sets the AWS session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Layers user-scoped credentials over these defaults.
    ///
    /// Each non-empty credential field replaces the matching default; empty
    /// or absent fields leave the default in place.
    #[must_use]
    pub fn overlay(mut self, credentials: &ClientCredentials) -> Self {
        fn pick(slot: &mut Option<String>, value: &Option<String>) {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                *slot = Some(value.to_string());
            }
        }

        pick(&mut self.api_key, &credentials.api_key);
        pick(&mut self.base_url, &credentials.endpoint);
        pick(&mut self.api_version, &credentials.azure_api_version);
        pick(&mut self.region, &credentials.aws_region);
        pick(&mut self.access_key_id, &credentials.aws_access_key_id);
        pick(&mut self.secret_access_key, &credentials.aws_secret_access_key);
        pick(&mut self.session_token, &credentials.aws_session_token);
        self
    }

    /// The API key, if one is set and non-empty.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// The configured base URL without a trailing slash, or `fallback`.
    #[must_use]
    pub fn base_url_or(&self, fallback: &str) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(fallback)
            .trim_end_matches('/')
            .to_string()
    }
}

/// The vendor's public endpoint, for providers that have a fixed one.
///
/// Azure has no default (every resource has its own endpoint) and Bedrock's
/// depends on the region.
#[must_use]
pub fn default_base_url(provider: ModelProvider) -> Option<&'static str> {
    let url = match provider {
        ModelProvider::Anthropic => "https://api.anthropic.com",
        ModelProvider::Google => "https://generativelanguage.googleapis.com",
        ModelProvider::Groq => "https://api.groq.com/openai/v1",
        ModelProvider::Mistral => "https://api.mistral.ai/v1",
        ModelProvider::Moonshot => "https://api.moonshot.cn/v1",
        ModelProvider::Ollama => "http://127.0.0.1:11434",
        ModelProvider::OpenAI => "https://api.openai.com/v1",
        ModelProvider::OpenRouter => "https://openrouter.ai/api/v1",
        ModelProvider::Perplexity => "https://api.perplexity.ai",
        ModelProvider::TogetherAI => "https://api.together.xyz/v1",
        ModelProvider::ZeroOne => "https://api.lingyiwanwu.com/v1",
        ModelProvider::ZhiPu => "https://open.bigmodel.cn/api/paas/v4",
        ModelProvider::Azure | ModelProvider::Bedrock => return None,
    };
    Some(url)
}
