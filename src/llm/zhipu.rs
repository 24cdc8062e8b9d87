//! ZhiPu (GLM) adapter.
//!
//! ZhiPu speaks the OpenAI chat schema but authenticates with a short-lived
//! HS256 JWT derived from an API key of the form `{id}.{secret}`. The token
//! is minted per call, so a malformed key only fails when a request is made.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use serde_json::json;

use super::client::{AdapterResponse, ChatAdapter};
use super::config::ProviderConfig;
use super::error::ProviderError;
use super::openai::OpenAICompatibleAdapter;
use crate::messages::ChatStreamPayload;
use crate::types::ModelProvider;

/// Lifetime of a minted token.
const TOKEN_TTL_SECS: i64 = 3600;

/// Adapter for the ZhiPu open platform.
#[derive(Debug, Clone)]
pub struct ZhiPuAdapter {
    inner: OpenAICompatibleAdapter,
    api_key: Option<String>,
}

impl ZhiPuAdapter {
    /// Creates an adapter from `config`.
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            inner: OpenAICompatibleAdapter::new(ModelProvider::ZhiPu, config),
            api_key: config.api_key().map(str::to_string),
        }
    }
}

/// Mints a bearer token for `api_key`, valid from `now_ms`.
///
/// The header carries ZhiPu's `sign_type` field, which the stock JWT header
/// type cannot hold, so the segments are assembled here and only the HS256
/// signature comes from `jsonwebtoken`.
///
/// # Errors
///
/// Returns an invalid-credentials error if the key is not `{id}.{secret}`
/// or cannot be used to sign.
pub(crate) fn mint_token(api_key: &str, now_ms: i64) -> Result<String, ProviderError> {
    let (id, secret) = api_key
        .split_once('.')
        .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
        .ok_or_else(|| {
            ProviderError::invalid_credentials("ZhiPu API key must have the form {id}.{secret}")
        })?;

    let header = json!({ "alg": "HS256", "sign_type": "SIGN" });
    let claims = json!({
        "api_key": id,
        "exp": now_ms + TOKEN_TTL_SECS * 1000,
        "timestamp": now_ms,
    });

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let signature = jsonwebtoken::crypto::sign(
        signing_input.as_bytes(),
        &EncodingKey::from_secret(secret.as_bytes()),
        Algorithm::HS256,
    )
    .map_err(|e| ProviderError::invalid_credentials(format!("cannot sign ZhiPu token: {}", e)))?;

    Ok(format!("{}.{}", signing_input, signature))
}

#[async_trait]
impl ChatAdapter for ZhiPuAdapter {
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::invalid_credentials("ZhiPu requires an API key"))?;
        let token = mint_token(api_key, chrono::Utc::now().timestamp_millis())?;

        self.inner.chat_with_bearer(payload, Some(&token)).await
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::ZhiPu
    }

    fn base_url(&self) -> &str {
        self.inner.base_url()
    }
}
