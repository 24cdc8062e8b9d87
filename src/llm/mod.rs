//! Provider adapters.
//!
//! One adapter per vendor API, all behind the [`ChatAdapter`] trait. Adapters
//! build vendor request bodies, authenticate and send them, and hand back the
//! raw response body together with how to decode it.

mod anthropic;
mod azure;
mod bedrock;
mod client;
mod config;
pub(crate) mod error;
mod google;
mod http;
mod ollama;
mod openai;
mod signing;
mod zhipu;

pub use anthropic::{AnthropicAdapter, ANTHROPIC_VERSION, BEDROCK_ANTHROPIC_VERSION};
pub use azure::AzureOpenAIAdapter;
pub use bedrock::{BedrockAdapter, BedrockFamily};
pub use client::{AdapterResponse, ChatAdapter, VendorStream};
pub use config::{
    default_base_url, ProviderConfig, DEFAULT_AWS_REGION, DEFAULT_AZURE_API_VERSION,
    DEFAULT_TIMEOUT,
};
pub use error::{ProviderError, ProviderErrorKind};
pub use google::GoogleAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAICompatibleAdapter;
pub use zhipu::ZhiPuAdapter;
