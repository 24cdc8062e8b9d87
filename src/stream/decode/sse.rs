//! Server-sent events.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use tracing::trace;

use super::{parse_chunk, ByteStream, ValueStream};
use crate::llm::ProviderError;

/// Decodes an SSE body into JSON chunks.
///
/// Blank `data:` fields (keep-alives) and the OpenAI `[DONE]` sentinel are
/// skipped.
#[must_use]
pub fn decode_sse(body: ByteStream) -> ValueStream {
    body.eventsource()
        .filter_map(|event| async move {
            match event {
                Ok(event) => {
                    let data = event.data.trim();
                    trace!(event = %event.event, data, "SSE event");
                    if data.is_empty() || data == "[DONE]" {
                        None
                    } else {
                        Some(Ok(parse_chunk(data)))
                    }
                }
                Err(EventStreamError::Transport(error)) => Some(Err(error)),
                Err(error) => Some(Err(ProviderError::frame(error.to_string()))),
            }
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decode::test_support::body;
    use futures::stream;
    use serde_json::{json, Value};

    async fn collect(parts: Vec<&'static str>) -> Vec<Result<Value, ProviderError>> {
        decode_sse(body(parts)).collect().await
    }

    #[tokio::test]
    async fn decodes_data_events() {
        let items = collect(vec!["data: {\"a\":1}\n\n", "data: {\"a\":2}\n\n"]).await;
        let values: Vec<Value> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn reassembles_events_split_across_reads() {
        let items = collect(vec!["da", "ta: {\"text\":\"he", "llo\"}\n", "\n"]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), &json!({"text": "hello"}));
    }

    #[tokio::test]
    async fn skips_done_sentinel_and_keepalives() {
        let items = collect(vec![": ping\n\n", "data: {\"a\":1}\n\n", "data: [DONE]\n\n"]).await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn named_events_keep_their_payload() {
        let items = collect(vec![
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\"}\n\n",
        ])
        .await;
        assert_eq!(
            items[0].as_ref().unwrap(),
            &json!({"type": "content_block_delta"})
        );
    }

    #[tokio::test]
    async fn non_json_data_passes_through_as_string() {
        let items = collect(vec!["data: hello world\n\n"]).await;
        assert_eq!(
            items[0].as_ref().unwrap(),
            &Value::String("hello world".into())
        );
    }

    #[tokio::test]
    async fn transport_errors_surface_unchanged() {
        let parts: Vec<Result<bytes::Bytes, ProviderError>> = vec![
            Ok(bytes::Bytes::from_static(b"data: {\"a\":1}\n\n")),
            Err(ProviderError::stream("connection reset")),
        ];
        let items: Vec<_> = decode_sse(Box::pin(stream::iter(parts))).collect().await;

        assert!(items[0].is_ok());
        assert_eq!(
            items[1].as_ref().unwrap_err(),
            &ProviderError::stream("connection reset")
        );
    }
}
