//! Configuration types: server-wide provider defaults and per-user credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::llm::ProviderConfig;
use crate::logging::LoggingConfig;
use crate::types::ModelProvider;

/// Root configuration structure.
///
/// Maps directly to the TOML configuration file format:
///
/// ```toml
/// [providers.openai]
/// api_key_env = "OPENAI_API_KEY"
///
/// [providers.ollama]
/// base_url = "http://gpu-box:11434"
/// timeout_secs = 300
///
/// [providers.bedrock]
/// region = "us-west-2"
/// access_key_id_env = "AWS_ACCESS_KEY_ID"
/// secret_access_key_env = "AWS_SECRET_ACCESS_KEY"
///
/// [logging]
/// level = "debug"
/// ```
///
/// Keys under `providers` are provider identifiers (`openai`, `azure`,
/// `bedrock`, ...). Read-only once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Server-wide defaults, keyed by provider identifier.
    #[serde(default)]
    pub providers: HashMap<String, ProviderDefaults>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that reads every provider's defaults from the standard
    /// environment variables (`OPENAI_API_KEY`, `AWS_REGION`, ...).
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_fallbacks()
    }

    /// Fills in standard environment lookups for providers the configuration
    /// does not mention.
    #[must_use]
    pub fn with_env_fallbacks(mut self) -> Self {
        for provider in ModelProvider::ALL {
            self.providers
                .entry(provider.as_str().to_string())
                .or_insert_with(|| ProviderDefaults::standard(provider));
        }
        self
    }

    /// Sets the defaults for one provider.
    #[must_use]
    pub fn with_provider(mut self, provider: ModelProvider, defaults: ProviderDefaults) -> Self {
        self.providers.insert(provider.as_str().to_string(), defaults);
        self
    }

    /// Resolves the server-wide defaults for `provider`.
    ///
    /// Environment indirections are read at this point. Providers without
    /// an entry resolve to an empty configuration.
    #[must_use]
    pub fn defaults_for(&self, provider: ModelProvider) -> ProviderConfig {
        self.providers
            .get(provider.as_str())
            .map(ProviderDefaults::resolve)
            .unwrap_or_default()
    }

    /// Returns true if no provider defaults are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns the number of configured providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

/// Server-wide defaults for one provider, as written in the config file.
///
/// Every value may be given directly or through an `*_env` variable name;
/// a non-empty environment variable wins over the direct value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDefaults {
    /// Direct API key value (discouraged - use api_key_env instead).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the base URL (e.g. `OPENAI_PROXY_URL`).
    #[serde(default)]
    pub base_url_env: Option<String>,

    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub api_version_env: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_env: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub access_key_id_env: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub secret_access_key_env: Option<String>,

    #[serde(default)]
    pub session_token_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderDefaults {
    /// The standard environment variables for `provider`.
    #[must_use]
    pub fn standard(provider: ModelProvider) -> Self {
        let env = |name: &str| Some(name.to_string());
        let keyed = |key: &str| Self {
            api_key_env: env(key),
            ..Self::default()
        };

        match provider {
            ModelProvider::OpenAI => Self {
                base_url_env: env("OPENAI_PROXY_URL"),
                ..keyed("OPENAI_API_KEY")
            },
            ModelProvider::Azure => Self {
                base_url_env: env("AZURE_ENDPOINT"),
                api_version_env: env("AZURE_API_VERSION"),
                ..keyed("AZURE_API_KEY")
            },
            ModelProvider::Anthropic => Self {
                base_url_env: env("ANTHROPIC_PROXY_URL"),
                ..keyed("ANTHROPIC_API_KEY")
            },
            ModelProvider::Google => Self {
                base_url_env: env("GOOGLE_PROXY_URL"),
                ..keyed("GOOGLE_API_KEY")
            },
            ModelProvider::Moonshot => Self {
                base_url_env: env("MOONSHOT_PROXY_URL"),
                ..keyed("MOONSHOT_API_KEY")
            },
            ModelProvider::Groq => Self {
                base_url_env: env("GROQ_PROXY_URL"),
                ..keyed("GROQ_API_KEY")
            },
            ModelProvider::Mistral => keyed("MISTRAL_API_KEY"),
            ModelProvider::Perplexity => keyed("PERPLEXITY_API_KEY"),
            ModelProvider::OpenRouter => keyed("OPENROUTER_API_KEY"),
            ModelProvider::TogetherAI => keyed("TOGETHERAI_API_KEY"),
            ModelProvider::ZeroOne => keyed("ZEROONE_API_KEY"),
            ModelProvider::ZhiPu => keyed("ZHIPU_API_KEY"),
            ModelProvider::Ollama => Self {
                base_url_env: env("OLLAMA_PROXY_URL"),
                ..Self::default()
            },
            ModelProvider::Bedrock => Self {
                region_env: env("AWS_REGION"),
                access_key_id_env: env("AWS_ACCESS_KEY_ID"),
                secret_access_key_env: env("AWS_SECRET_ACCESS_KEY"),
                session_token_env: env("AWS_SESSION_TOKEN"),
                ..Self::default()
            },
        }
    }

    /// Sets a direct API key (discouraged).
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API key environment variable.
    #[must_use]
    pub fn with_api_key_env(mut self, env_var: impl Into<String>) -> Self {
        self.api_key_env = Some(env_var.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Resolves environment indirections into a runtime `ProviderConfig`.
    #[must_use]
    pub fn resolve(&self) -> ProviderConfig {
        let mut config = ProviderConfig {
            api_key: lookup(&self.api_key_env, &self.api_key),
            base_url: lookup(&self.base_url_env, &self.base_url),
            api_version: lookup(&self.api_version_env, &self.api_version),
            region: lookup(&self.region_env, &self.region),
            access_key_id: lookup(&self.access_key_id_env, &self.access_key_id),
            secret_access_key: lookup(&self.secret_access_key_env, &self.secret_access_key),
            session_token: lookup(&self.session_token_env, &None),
            ..ProviderConfig::default()
        };

        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config
    }
}

fn lookup(env_var: &Option<String>, direct: &Option<String>) -> Option<String> {
    env_var
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .filter(|value| !value.is_empty())
        .or_else(|| direct.clone())
}

/// Per-request credentials supplied by the end user.
///
/// Every field is optional. Present, non-empty fields override the
/// server-wide defaults for that call only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub azure_api_version: Option<String>,
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,
}

impl ClientCredentials {
    /// Credentials holding only an API key.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Sets the endpoint override.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_defaults_cover_every_provider() {
        let config = RuntimeConfig::from_env();
        assert_eq!(config.provider_count(), ModelProvider::ALL.len());
        assert_eq!(
            config.providers["openai"].api_key_env.as_deref(),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(
            config.providers["bedrock"].region_env.as_deref(),
            Some("AWS_REGION")
        );
        assert_eq!(
            config.providers["ollama"].base_url_env.as_deref(),
            Some("OLLAMA_PROXY_URL")
        );
    }

    #[test]
    fn env_fallbacks_keep_explicit_entries() {
        let config = RuntimeConfig::new()
            .with_provider(
                ModelProvider::OpenAI,
                ProviderDefaults::default().with_api_key("file-key"),
            )
            .with_env_fallbacks();

        assert_eq!(config.providers["openai"].api_key.as_deref(), Some("file-key"));
        assert!(config.providers["openai"].api_key_env.is_none());
    }

    #[test]
    fn defaults_for_unknown_entry_is_empty() {
        let config = RuntimeConfig::new();
        let resolved = config.defaults_for(ModelProvider::Groq);
        assert_eq!(resolved, ProviderConfig::default());
    }

    #[test]
    fn resolve_prefers_environment_variable() {
        std::env::set_var("AGENT_RUNTIME_TEST_RESOLVE_KEY", "from-env");
        let defaults = ProviderDefaults::default()
            .with_api_key("direct")
            .with_api_key_env("AGENT_RUNTIME_TEST_RESOLVE_KEY");

        assert_eq!(defaults.resolve().api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn resolve_falls_back_to_direct_value_when_env_unset() {
        let defaults = ProviderDefaults::default()
            .with_api_key("direct")
            .with_api_key_env("AGENT_RUNTIME_TEST_UNSET_VARIABLE");

        assert_eq!(defaults.resolve().api_key.as_deref(), Some("direct"));
    }

    #[test]
    fn resolve_applies_timeout() {
        let resolved = ProviderDefaults::default().with_timeout_secs(7).resolve();
        assert_eq!(resolved.timeout, Duration::from_secs(7));
    }

    #[test]
    fn credentials_deserialize_from_camel_case() {
        let credentials: ClientCredentials = serde_json::from_value(serde_json::json!({
            "apiKey": "k",
            "endpoint": "https://proxy",
            "awsRegion": "eu-central-1",
            "azureApiVersion": "2024-06-01"
        }))
        .unwrap();

        assert_eq!(credentials.api_key.as_deref(), Some("k"));
        assert_eq!(credentials.aws_region.as_deref(), Some("eu-central-1"));
        assert_eq!(credentials.azure_api_version.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn empty_credentials_deserialize() {
        let credentials: ClientCredentials = serde_json::from_str("{}").unwrap();
        assert_eq!(credentials, ClientCredentials::default());
    }
}
