//! Provider adapter trait.
//!
//! This module defines the `ChatAdapter` trait which abstracts over the
//! vendor APIs. An adapter knows how to build its vendor's request, how to
//! authenticate it, and which framing and chunk shape the vendor answers
//! with. It never interprets the answer: normalization happens in
//! [`crate::stream`] and failure classification in [`crate::classify`].

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::error::ProviderError;
use crate::messages::ChatStreamPayload;
use crate::stream::{ByteStream, ChunkShape, Framing};
use crate::types::ModelProvider;

/// A vendor response body that has not been normalized yet.
pub struct VendorStream {
    /// How the body is framed on the wire
    pub framing: Framing,
    /// Shape of the JSON chunks inside the frames
    pub shape: ChunkShape,
    /// The body bytes, as they arrive
    pub body: ByteStream,
}

impl VendorStream {
    #[must_use]
    pub fn new(framing: Framing, shape: ChunkShape, body: ByteStream) -> Self {
        Self {
            framing,
            shape,
            body,
        }
    }
}

impl std::fmt::Debug for VendorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorStream")
            .field("framing", &self.framing)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// What a vendor call returned.
#[derive(Debug)]
pub enum AdapterResponse {
    /// A streaming body, for `payload.stream == true`
    Stream(VendorStream),
    /// A complete JSON body, for `payload.stream == false`
    Completion {
        /// Shape of the body
        shape: ChunkShape,
        /// The vendor's JSON response
        body: Value,
    },
}

/// Trait for provider adapters.
///
/// Construction of an adapter never fails and never touches the network;
/// missing or malformed credentials surface from [`ChatAdapter::chat`].
///
/// # Example
///
/// ```ignore
/// use agent_runtime::llm::{ChatAdapter, OpenAICompatibleAdapter, ProviderConfig};
///
/// let adapter = OpenAICompatibleAdapter::openai(&ProviderConfig::with_key("sk-..."));
/// let response = adapter.chat(&payload).await?;
/// ```
#[async_trait]
pub trait ChatAdapter: Send + Sync + std::fmt::Debug {
    /// Issues one chat request.
    ///
    /// # Errors
    ///
    /// Returns the vendor-native error when the request cannot be built or
    /// sent, or the vendor answers with a non-success status.
    async fn chat(&self, payload: &ChatStreamPayload) -> Result<AdapterResponse, ProviderError>;

    /// The provider this adapter talks to.
    fn provider(&self) -> ModelProvider;

    /// Base URL requests are sent to.
    fn base_url(&self) -> &str;
}
