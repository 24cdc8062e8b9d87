//! Core identifier types.
//!
//! - [`StreamId`]: TypeID stamped onto every chunk of one stream
//! - [`ModelProvider`]: vendors with a dedicated adapter

mod model_provider;
mod stream_id;

pub use model_provider::ModelProvider;
pub use stream_id::{InvalidStreamId, StreamId};
