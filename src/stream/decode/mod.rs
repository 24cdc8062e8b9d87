//! Source normalization: vendor byte framings decoded into JSON objects.
//!
//! Whatever the framing, the output is a stream of parsed JSON values, one
//! per vendor chunk. Text that is not JSON is passed on as a JSON string so
//! the protocol transform can forward it as raw data. Framing violations and
//! body read failures end the stream with an `Err`.

mod event_stream;
mod json_lines;
mod sse;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::llm::ProviderError;

pub use event_stream::{
    decode_event_stream, EventStreamDecoder, EventStreamMessage, HeaderValue,
};
pub use json_lines::decode_json_lines;
pub use sse::decode_sse;

/// Raw response body as delivered by the transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Decoded vendor chunks.
pub type ValueStream = BoxStream<'static, Result<Value, ProviderError>>;

/// Byte-level encoding of a vendor's streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// `text/event-stream`, one JSON document per `data:` field
    Sse,
    /// Newline-delimited JSON objects
    JsonLines,
    /// AWS `application/vnd.amazon.eventstream` binary frames
    AwsEventStream,
}

impl Framing {
    /// Decodes `body` according to this framing.
    #[must_use]
    pub fn decode(self, body: ByteStream) -> ValueStream {
        match self {
            Self::Sse => decode_sse(body),
            Self::JsonLines => decode_json_lines(body),
            Self::AwsEventStream => decode_event_stream(body),
        }
    }
}

/// Parses one textual chunk; non-JSON text is kept as a JSON string.
pub(crate) fn parse_chunk(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chunk_keeps_non_json_text() {
        assert_eq!(parse_chunk("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_chunk("not json"), Value::String("not json".into()));
    }

    #[test]
    fn framing_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Framing::AwsEventStream).unwrap(),
            "\"aws_event_stream\""
        );
    }
}
