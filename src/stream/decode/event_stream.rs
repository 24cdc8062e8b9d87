//! AWS event-stream binary framing, as used by Bedrock response streams.
//!
//! Each message is laid out as:
//!
//! ```text
//! [total len: u32][headers len: u32][prelude crc: u32]
//! [headers ...][payload ...][message crc: u32]
//! ```
//!
//! All integers are big-endian; both checksums are CRC-32 over everything
//! preceding them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tracing::trace;

use super::{parse_chunk, ByteStream, ValueStream};
use crate::llm::ProviderError;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_MESSAGE_LEN: usize = 24 * 1024 * 1024;

/// A typed header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl HeaderValue {
    fn type_tag(&self) -> u8 {
        match self {
            Self::Bool(true) => 0,
            Self::Bool(false) => 1,
            Self::Byte(_) => 2,
            Self::Short(_) => 3,
            Self::Int(_) => 4,
            Self::Long(_) => 5,
            Self::Bytes(_) => 6,
            Self::String(_) => 7,
            Self::Timestamp(_) => 8,
            Self::Uuid(_) => 9,
        }
    }
}

/// One decoded event-stream message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventStreamMessage {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl EventStreamMessage {
    /// Creates a message with no headers.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: HeaderValue) -> Self {
        self.headers.push((name.into(), value));
        self
    }

    /// Adds a string header.
    #[must_use]
    pub fn with_str_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_header(name, HeaderValue::String(value.into()))
    }

    /// The value of a string header.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(s) if key == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// Serializes the message into its wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut headers = Vec::new();
        for (name, value) in &self.headers {
            headers.push(name.len() as u8);
            headers.extend_from_slice(name.as_bytes());
            headers.push(value.type_tag());
            match value {
                HeaderValue::Bool(_) => {}
                HeaderValue::Byte(v) => headers.extend_from_slice(&v.to_be_bytes()),
                HeaderValue::Short(v) => headers.extend_from_slice(&v.to_be_bytes()),
                HeaderValue::Int(v) => headers.extend_from_slice(&v.to_be_bytes()),
                HeaderValue::Long(v) | HeaderValue::Timestamp(v) => {
                    headers.extend_from_slice(&v.to_be_bytes());
                }
                HeaderValue::Bytes(v) => {
                    headers.extend_from_slice(&(v.len() as u16).to_be_bytes());
                    headers.extend_from_slice(v);
                }
                HeaderValue::String(v) => {
                    headers.extend_from_slice(&(v.len() as u16).to_be_bytes());
                    headers.extend_from_slice(v.as_bytes());
                }
                HeaderValue::Uuid(v) => headers.extend_from_slice(v),
            }
        }

        let total = MIN_MESSAGE_LEN + headers.len() + self.payload.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(&(headers.len() as u32).to_be_bytes());
        let prelude_crc = crc32fast::hash(&out);
        out.extend_from_slice(&prelude_crc.to_be_bytes());
        out.extend_from_slice(&headers);
        out.extend_from_slice(&self.payload);
        let message_crc = crc32fast::hash(&out);
        out.extend_from_slice(&message_crc.to_be_bytes());
        out
    }
}

/// Incremental decoder; buffers at most one partial message.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the network.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet forming a complete message.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Takes the next complete message off the buffer.
    ///
    /// # Errors
    ///
    /// Returns a frame error on checksum mismatch, impossible lengths, or
    /// malformed headers. The decoder should not be used afterwards.
    pub fn next_message(&mut self) -> Result<Option<EventStreamMessage>, ProviderError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total = read_u32(&self.buffer[0..4]) as usize;
        let headers_len = read_u32(&self.buffer[4..8]) as usize;
        let prelude_crc = read_u32(&self.buffer[8..12]);

        if crc32fast::hash(&self.buffer[0..8]) != prelude_crc {
            return Err(ProviderError::frame("event-stream prelude checksum mismatch"));
        }
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total)
            || headers_len > total - MIN_MESSAGE_LEN
        {
            return Err(ProviderError::frame(format!(
                "event-stream message length {total} with {headers_len} header bytes is invalid"
            )));
        }
        if self.buffer.len() < total {
            return Ok(None);
        }

        let message: Vec<u8> = self.buffer.drain(..total).collect();
        let crc_offset = total - CRC_LEN;
        if crc32fast::hash(&message[..crc_offset]) != read_u32(&message[crc_offset..]) {
            return Err(ProviderError::frame("event-stream message checksum mismatch"));
        }

        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(&message[PRELUDE_LEN..headers_end])?;
        let payload = Bytes::copy_from_slice(&message[headers_end..crc_offset]);

        Ok(Some(EventStreamMessage { headers, payload }))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn parse_headers(mut bytes: &[u8]) -> Result<Vec<(String, HeaderValue)>, ProviderError> {
    fn take<'a>(bytes: &mut &'a [u8], n: usize) -> Result<&'a [u8], ProviderError> {
        if bytes.len() < n {
            return Err(ProviderError::frame("event-stream header truncated"));
        }
        let (head, tail) = bytes.split_at(n);
        *bytes = tail;
        Ok(head)
    }

    fn fixed<const N: usize>(bytes: &mut &[u8]) -> Result<[u8; N], ProviderError> {
        let mut out = [0u8; N];
        out.copy_from_slice(take(bytes, N)?);
        Ok(out)
    }

    let mut headers = Vec::new();
    while !bytes.is_empty() {
        let name_len = take(&mut bytes, 1)?[0] as usize;
        let name = String::from_utf8_lossy(take(&mut bytes, name_len)?).into_owned();
        let tag = take(&mut bytes, 1)?[0];
        let value = match tag {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(i8::from_be_bytes(fixed(&mut bytes)?)),
            3 => HeaderValue::Short(i16::from_be_bytes(fixed(&mut bytes)?)),
            4 => HeaderValue::Int(i32::from_be_bytes(fixed(&mut bytes)?)),
            5 => HeaderValue::Long(i64::from_be_bytes(fixed(&mut bytes)?)),
            6 | 7 => {
                let len = u16::from_be_bytes(fixed(&mut bytes)?) as usize;
                let raw = take(&mut bytes, len)?;
                if tag == 6 {
                    HeaderValue::Bytes(raw.to_vec())
                } else {
                    HeaderValue::String(String::from_utf8_lossy(raw).into_owned())
                }
            }
            8 => HeaderValue::Timestamp(i64::from_be_bytes(fixed(&mut bytes)?)),
            9 => HeaderValue::Uuid(fixed(&mut bytes)?),
            other => {
                return Err(ProviderError::frame(format!(
                    "unknown event-stream header type {other}"
                )))
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Decodes a Bedrock response stream into the model's JSON chunks.
///
/// `chunk` events carry `{"bytes": "<base64 JSON>"}`; the inner document is
/// what gets emitted. `exception` and `error` messages end the stream with
/// a vendor error.
#[must_use]
pub fn decode_event_stream(mut body: ByteStream) -> ValueStream {
    Box::pin(async_stream::stream! {
        let mut decoder = EventStreamDecoder::new();

        while let Some(read) = body.next().await {
            let bytes = match read {
                Ok(bytes) => bytes,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            decoder.push(&bytes);

            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => match interpret(&message) {
                        Ok(Some(value)) => yield Ok(value),
                        Ok(None) => {}
                        Err(error) => {
                            yield Err(error);
                            return;
                        }
                    },
                    Ok(None) => break,
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                }
            }
        }

        if decoder.buffered() > 0 {
            yield Err(ProviderError::frame(format!(
                "event-stream ended inside a message ({} bytes buffered)",
                decoder.buffered()
            )));
        }
    })
}

fn interpret(message: &EventStreamMessage) -> Result<Option<Value>, ProviderError> {
    match message.header_str(":message-type") {
        Some("exception") => {
            let error_type = message
                .header_str(":exception-type")
                .unwrap_or("exception")
                .to_string();
            let text = String::from_utf8_lossy(&message.payload);
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| crate::llm::error::extract_message(&v))
                .unwrap_or_else(|| text.into_owned());
            Err(ProviderError::vendor(error_type, detail))
        }
        Some("error") => Err(ProviderError::vendor(
            message.header_str(":error-code").unwrap_or("error"),
            message.header_str(":error-message").unwrap_or_default(),
        )),
        _ => {
            let event_type = message.header_str(":event-type").unwrap_or_default();
            trace!(event_type, len = message.payload.len(), "event-stream message");
            if message.payload.is_empty() {
                return Ok(None);
            }

            let envelope = parse_chunk(&String::from_utf8_lossy(&message.payload));
            match envelope.get("bytes").and_then(Value::as_str) {
                Some(encoded) => {
                    let decoded = STANDARD.decode(encoded).map_err(|e| {
                        ProviderError::frame(format!("chunk payload is not base64: {e}"))
                    })?;
                    Ok(Some(parse_chunk(&String::from_utf8_lossy(&decoded))))
                }
                None => Ok(Some(envelope)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderErrorKind;
    use crate::stream::decode::test_support::body;
    use serde_json::json;

    fn chunk_frame(inner: &Value) -> Vec<u8> {
        let envelope = json!({ "bytes": STANDARD.encode(inner.to_string()) });
        EventStreamMessage::new(envelope.to_string())
            .with_str_header(":event-type", "chunk")
            .with_str_header(":content-type", "application/json")
            .with_str_header(":message-type", "event")
            .encode()
    }

    #[test]
    fn decoder_round_trips_headers() {
        let message = EventStreamMessage::new("payload")
            .with_str_header(":event-type", "chunk")
            .with_header("flag", HeaderValue::Bool(false))
            .with_header("count", HeaderValue::Int(-7))
            .with_header("at", HeaderValue::Timestamp(1_700_000_000_000))
            .with_header("raw", HeaderValue::Bytes(vec![1, 2, 3]));

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&message.encode());

        assert_eq!(decoder.next_message().unwrap(), Some(message));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decoder_waits_for_complete_message() {
        let frame = EventStreamMessage::new("abc").encode();
        let mut decoder = EventStreamDecoder::new();

        decoder.push(&frame[..5]);
        assert_eq!(decoder.next_message().unwrap(), None);
        decoder.push(&frame[5..frame.len() - 1]);
        assert_eq!(decoder.next_message().unwrap(), None);
        decoder.push(&frame[frame.len() - 1..]);
        assert!(decoder.next_message().unwrap().is_some());
    }

    #[test]
    fn corrupted_payload_fails_message_checksum() {
        let mut frame = EventStreamMessage::new("abc").encode();
        let payload_at = frame.len() - CRC_LEN - 1;
        frame[payload_at] ^= 0xff;

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        let error = decoder.next_message().unwrap_err();
        assert!(matches!(error.kind, ProviderErrorKind::Frame { .. }));
    }

    #[test]
    fn corrupted_prelude_fails_fast() {
        let mut frame = EventStreamMessage::new("abc").encode();
        frame[0] ^= 0x01;

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        assert!(decoder.next_message().is_err());
    }

    #[tokio::test]
    async fn chunks_split_across_reads_are_reassembled() {
        let mut bytes = chunk_frame(&json!({"n": 1}));
        bytes.extend(chunk_frame(&json!({"n": 2})));
        let (a, b) = bytes.split_at(bytes.len() / 2 + 3);

        let values: Vec<Value> = decode_event_stream(body(vec![a.to_vec(), b.to_vec()]))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn exception_message_ends_stream_with_vendor_error() {
        let mut bytes = chunk_frame(&json!({"n": 1}));
        bytes.extend(
            EventStreamMessage::new(r#"{"message":"Too many requests, please wait"}"#)
                .with_str_header(":message-type", "exception")
                .with_str_header(":exception-type", "throttlingException")
                .encode(),
        );
        bytes.extend(chunk_frame(&json!({"n": 2})));

        let items: Vec<_> = decode_event_stream(body(vec![bytes])).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1].as_ref().unwrap_err(),
            &ProviderError::vendor("throttlingException", "Too many requests, please wait")
        );
    }

    #[tokio::test]
    async fn truncated_body_is_a_frame_error() {
        let frame = chunk_frame(&json!({"n": 1}));
        let items: Vec<_> = decode_event_stream(body(vec![frame[..frame.len() - 2].to_vec()]))
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        let error = items[0].as_ref().unwrap_err();
        assert!(matches!(error.kind, ProviderErrorKind::Frame { .. }));
    }
}
