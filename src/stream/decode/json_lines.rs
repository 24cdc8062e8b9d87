//! Newline-delimited JSON.

use futures::StreamExt;
use memchr::memchr;

use super::{parse_chunk, ByteStream, ValueStream};

/// Decodes a body of newline-delimited JSON objects.
///
/// Only the bytes of the current partial line are buffered. A final line
/// without a trailing newline is still emitted.
#[must_use]
pub fn decode_json_lines(mut body: ByteStream) -> ValueStream {
    Box::pin(async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(read) = body.next().await {
            let bytes = match read {
                Ok(bytes) => bytes,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            while let Some(newline_pos) = memchr(b'\n', &buffer) {
                let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                if let Some(value) = parse_line(&line) {
                    yield Ok(value);
                }
            }
        }

        if let Some(value) = parse_line(&buffer) {
            yield Ok(value);
        }
    })
}

fn parse_line(line: &[u8]) -> Option<serde_json::Value> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(parse_chunk(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderError;
    use crate::stream::decode::test_support::body;
    use bytes::Bytes;
    use futures::stream;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn decodes_one_object_per_line() {
        let values: Vec<Value> = decode_json_lines(body(vec![
            "{\"n\":1}\n{\"n\":2}\n",
            "{\"n\":3}\n",
        ]))
        .map(Result::unwrap)
        .collect()
        .await;

        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn joins_lines_split_across_reads() {
        let values: Vec<Value> = decode_json_lines(body(vec!["{\"message\":", "{\"content\":\"hi\"}}\r\n"]))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(values, vec![json!({"message": {"content": "hi"}})]);
    }

    #[tokio::test]
    async fn emits_unterminated_final_line() {
        let values: Vec<Value> = decode_json_lines(body(vec!["{\"done\":true}"]))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(values, vec![json!({"done": true})]);
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let values: Vec<Value> = decode_json_lines(body(vec!["\n\n{\"a\":1}\n\n"]))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(values.len(), 1);
    }

    #[tokio::test]
    async fn read_error_ends_stream() {
        let parts: Vec<Result<Bytes, ProviderError>> = vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n{\"a\":")),
            Err(ProviderError::stream("eof")),
            Ok(Bytes::from_static(b"2}\n")),
        ];
        let items: Vec<_> = decode_json_lines(Box::pin(stream::iter(parts))).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
