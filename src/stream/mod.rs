//! Stream transform pipeline.
//!
//! Vendor response bodies pass through three stages:
//!
//! 1. [`decode`]: the vendor's byte framing (SSE, JSON lines, AWS
//!    event-stream) becomes a stream of JSON chunks
//! 2. [`ProtocolTransformer`]: each vendor chunk becomes zero or more
//!    canonical [`StreamProtocolChunk`]s, driven by the rule list of its
//!    [`ChunkShape`]
//! 3. [`ChatStream::drive`]: canonical chunks fan out to
//!    [`ChatStreamCallbacks`]
//!
//! Non-streaming responses skip the pipeline and are normalized by
//! [`completion_from`].

mod callbacks;
mod completion;
pub mod decode;
mod pipeline;
mod protocol;
mod transform;

pub use callbacks::{ChatStreamCallbacks, CollectedResponse, NoopCallbacks};
pub use completion::completion_from;
pub use decode::{ByteStream, Framing, ValueStream};
pub use pipeline::{CancelHandle, ChatStream, StreamOutcome};
pub use protocol::{ChunkKind, StreamProtocolChunk, StreamStack, ToolCallChunk, ToolCallFunction};
pub use transform::{ChunkShape, ChunkTransform, Emit, ProtocolTransformer, Rule};
