//! # agent-runtime: multi-provider LLM runtime
//!
//! One abstraction that dispatches chat-completion requests to heterogeneous
//! model providers and turns every vendor's streaming wire format into one
//! canonical chunk protocol.
//!
//! ## Architecture
//!
//! - **Runtime** ([`runtime`]): resolves an adapter from a provider id and
//!   per-user credentials layered over server defaults
//! - **Adapters** ([`llm`]): vendor request construction, auth, transport
//! - **Stream pipeline** ([`stream`]): framing decode, protocol transform,
//!   callback fan-out
//! - **Classifier** ([`classify`]): vendor failures mapped into [`ErrorKind`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agent_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = AgentRuntime::initialize(
//!         "anthropic",
//!         &ClientCredentials::api_key("sk-ant-..."),
//!         &RuntimeConfig::from_env(),
//!     );
//!
//!     let payload = ChatStreamPayload::new(
//!         "claude-sonnet-4-20250514",
//!         vec![ChatMessage::user("Hello!")],
//!     );
//!
//!     match runtime.chat(&payload).await {
//!         Ok(response) => {
//!             let collected = response.into_stream().collect().await;
//!             println!("{:?}", collected);
//!         }
//!         Err(error) => eprintln!("{}", error),
//!     }
//! }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod messages;
pub mod runtime;
pub mod stream;
pub mod types;

pub use error::{ChatCompletionError, ChatCompletionErrorPayload, ConfigError, ErrorKind};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classify::{classify, ErrorContext};
    pub use crate::config::{ClientCredentials, ProviderDefaults, RuntimeConfig};
    pub use crate::error::{ChatCompletionError, ErrorKind};
    pub use crate::llm::{ChatAdapter, ProviderConfig, ProviderError};
    pub use crate::messages::*;
    pub use crate::runtime::{AgentRuntime, ChatResponse};
    pub use crate::stream::{
        CancelHandle, ChatStream, ChatStreamCallbacks, ChunkKind, CollectedResponse,
        StreamOutcome, StreamProtocolChunk, ToolCallChunk,
    };
    pub use crate::types::{ModelProvider, StreamId};
}
