//! Provider identifiers recognized by the dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A model vendor with a dedicated adapter.
///
/// Identifiers arrive as open strings at the boundary; [`ModelProvider::parse`]
/// returns `None` for anything unrecognized so the caller can apply its own
/// fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Anthropic,
    Azure,
    Bedrock,
    Google,
    Groq,
    Mistral,
    Moonshot,
    Ollama,
    OpenAI,
    OpenRouter,
    Perplexity,
    TogetherAI,
    ZeroOne,
    ZhiPu,
}

impl ModelProvider {
    /// Every provider with a dedicated adapter.
    pub const ALL: [ModelProvider; 14] = [
        Self::Anthropic,
        Self::Azure,
        Self::Bedrock,
        Self::Google,
        Self::Groq,
        Self::Mistral,
        Self::Moonshot,
        Self::Ollama,
        Self::OpenAI,
        Self::OpenRouter,
        Self::Perplexity,
        Self::TogetherAI,
        Self::ZeroOne,
        Self::ZhiPu,
    ];

    /// Resolves a provider identifier, case-insensitively.
    ///
    /// Accepts the canonical identifiers plus the legacy aliases
    /// `azureOpenAI` and `chatglm`.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        let provider = match id.as_str() {
            "anthropic" => Self::Anthropic,
            "azure" | "azureopenai" => Self::Azure,
            "bedrock" => Self::Bedrock,
            "google" => Self::Google,
            "groq" => Self::Groq,
            "mistral" => Self::Mistral,
            "moonshot" => Self::Moonshot,
            "ollama" => Self::Ollama,
            "openai" => Self::OpenAI,
            "openrouter" => Self::OpenRouter,
            "perplexity" => Self::Perplexity,
            "togetherai" => Self::TogetherAI,
            "zeroone" => Self::ZeroOne,
            "zhipu" | "chatglm" => Self::ZhiPu,
            _ => return None,
        };
        Some(provider)
    }

    /// Canonical identifier, as used for config keys and error payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Azure => "azure",
            Self::Bedrock => "bedrock",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::Moonshot => "moonshot",
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
            Self::Perplexity => "perplexity",
            Self::TogetherAI => "togetherai",
            Self::ZeroOne => "zeroone",
            Self::ZhiPu => "zhipu",
        }
    }

    /// Whether the vendor speaks the OpenAI chat-completions wire format.
    #[must_use]
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(
            self,
            Self::Anthropic | Self::Bedrock | Self::Google | Self::Ollama
        )
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
