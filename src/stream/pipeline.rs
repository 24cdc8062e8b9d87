//! The normalized chat stream.
//!
//! [`ChatStream`] chains source normalization and the protocol transform
//! into one lazy, pull-based stream of [`StreamProtocolChunk`]s. Nothing is
//! read from the vendor body until the consumer polls; at most one partial
//! frame or line is buffered.
//!
//! A stream ends after the vendor body ends, after its first error chunk, or
//! as soon as it is cancelled through a [`CancelHandle`]. Cancelling drops
//! the vendor body and the stream's tool-call buffer on the next poll.

use async_stream::stream;
use futures::future::Future;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, trace};

use super::callbacks::{ChatStreamCallbacks, CollectedResponse};
use super::protocol::{ChunkKind, StreamProtocolChunk};
use super::transform::ProtocolTransformer;
use crate::classify::ErrorContext;
use crate::error::ChatCompletionError;
use crate::llm::VendorStream;
use crate::types::StreamId;

/// Cancels a [`ChatStream`] from anywhere, including from inside one of its
/// callbacks.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    /// Creates a handle not yet attached to any stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// How a driven stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The vendor stream ended normally
    Completed {
        /// All text deltas, concatenated
        text: String,
    },
    /// The stream ended with an error chunk
    Failed(ChatCompletionError),
    /// The stream was cancelled; no terminal callback fired
    Cancelled,
}

impl StreamOutcome {
    /// Returns true if the stream completed normally.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A normalized, cancellable chat stream.
pub struct ChatStream {
    id: StreamId,
    inner: Option<BoxStream<'static, StreamProtocolChunk>>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ChatStream {
    /// Normalizes a vendor response body.
    ///
    /// Failures while reading or decoding are classified with `context` and
    /// end the stream with one error chunk.
    #[must_use]
    pub fn from_vendor(vendor: VendorStream, context: ErrorContext) -> Self {
        let id = StreamId::new();
        let inner = normalize(vendor, id.clone(), context);
        Self::from_chunks(id, inner)
    }

    /// Wraps an already normalized chunk stream.
    #[must_use]
    pub fn from_chunks<S>(id: StreamId, chunks: S) -> Self
    where
        S: Stream<Item = StreamProtocolChunk> + Send + 'static,
    {
        Self::with_cancel(id, chunks, CancelHandle::new())
    }

    /// Wraps `chunks`, cancelled through an existing `handle`.
    #[must_use]
    pub fn with_cancel<S>(id: StreamId, chunks: S, handle: CancelHandle) -> Self
    where
        S: Stream<Item = StreamProtocolChunk> + Send + 'static,
    {
        let token = handle.0;
        Self {
            id,
            inner: Some(chunks.boxed()),
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
        }
    }

    /// The id stamped on every chunk of this stream.
    #[must_use]
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// A handle that cancels this stream.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.token.clone())
    }

    /// Drives the stream to its end, fanning chunks out to `callbacks`.
    ///
    /// `on_start` fires first, then one hook per chunk in arrival order, then
    /// exactly one of `on_completion` or `on_error`. Once the stream is
    /// cancelled no hook fires at all, including the terminal ones.
    pub async fn drive<C>(mut self, callbacks: &mut C) -> StreamOutcome
    where
        C: ChatStreamCallbacks + ?Sized,
    {
        if self.token.is_cancelled() {
            return StreamOutcome::Cancelled;
        }
        callbacks.on_start(&self.id);

        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            if self.token.is_cancelled() {
                break;
            }
            match chunk.kind {
                ChunkKind::Text(delta) => {
                    callbacks.on_text(&delta);
                    text.push_str(&delta);
                }
                ChunkKind::ToolCalls(calls) => callbacks.on_tool_calls(&calls),
                ChunkKind::Stop(reason) => callbacks.on_stop(&reason),
                ChunkKind::Data(data) => callbacks.on_data(&data),
                ChunkKind::Error(error) => {
                    callbacks.on_error(&error);
                    return StreamOutcome::Failed(error);
                }
            }
        }

        if self.token.is_cancelled() {
            debug!(id = %self.id, "stream cancelled");
            return StreamOutcome::Cancelled;
        }
        callbacks.on_completion(&text);
        StreamOutcome::Completed { text }
    }

    /// Drives the stream and gathers everything it produced.
    ///
    /// A cancelled stream yields what was gathered before the cancel.
    ///
    /// # Errors
    ///
    /// Returns the stream's error chunk, if it ended with one.
    pub async fn collect(self) -> Result<CollectedResponse, ChatCompletionError> {
        let mut collected = CollectedResponse::default();
        match self.drive(&mut collected).await {
            StreamOutcome::Failed(error) => Err(error),
            StreamOutcome::Completed { .. } | StreamOutcome::Cancelled => Ok(collected),
        }
    }

    /// Renders every chunk as a server-sent event.
    pub fn into_sse(self) -> impl Stream<Item = String> + Send {
        self.map(|chunk| chunk.to_sse())
    }
}

impl Stream for ChatStream {
    type Item = StreamProtocolChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.token.is_cancelled() || this.cancelled.as_mut().poll(cx).is_ready() {
            if this.inner.take().is_some() {
                trace!(id = %this.id, "dropping vendor stream after cancel");
            }
            return Poll::Ready(None);
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let next = inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = next {
            this.inner = None;
        }
        next
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("id", &self.id)
            .field("finished", &self.inner.is_none())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

fn normalize(
    vendor: VendorStream,
    id: StreamId,
    context: ErrorContext,
) -> BoxStream<'static, StreamProtocolChunk> {
    let VendorStream {
        framing,
        shape,
        body,
    } = vendor;
    let mut values = framing.decode(body);
    let mut transformer = ProtocolTransformer::new(shape, id);

    Box::pin(stream! {
        while let Some(next) = values.next().await {
            match next.and_then(|value| transformer.push(&value)) {
                Ok(chunks) => {
                    for chunk in chunks {
                        yield chunk;
                    }
                }
                Err(source) => {
                    debug!(id = %transformer.id(), error = %source, "vendor stream failed");
                    yield StreamProtocolChunk {
                        id: transformer.id().clone(),
                        kind: ChunkKind::Error(context.error(source)),
                    };
                    return;
                }
            }
        }
        if let Some(chunk) = transformer.finish() {
            yield chunk;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::llm::ProviderError;
    use crate::stream::decode::test_support::body;
    use crate::stream::{ChunkShape, Framing, ToolCallChunk};
    use crate::types::ModelProvider;
    use bytes::Bytes;
    use futures::stream;
    use serde_json::Value;

    fn context() -> ErrorContext {
        ErrorContext::new("openai", ModelProvider::OpenAI, None)
    }

    fn openai_sse(events: &[&str]) -> ChatStream {
        let parts: Vec<String> = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
        ChatStream::from_vendor(
            VendorStream::new(Framing::Sse, ChunkShape::OpenAI, body(parts)),
            context(),
        )
    }

    /// Records every hook as a string.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        cancel_after_text: Option<CancelHandle>,
    }

    impl ChatStreamCallbacks for Recorder {
        fn on_start(&mut self, _id: &StreamId) {
            self.events.push("start".to_string());
        }
        fn on_text(&mut self, text: &str) {
            self.events.push(format!("text:{}", text));
            if let Some(handle) = &self.cancel_after_text {
                handle.cancel();
            }
        }
        fn on_tool_calls(&mut self, calls: &[ToolCallChunk]) {
            self.events.push(format!("tools:{}", calls.len()));
        }
        fn on_stop(&mut self, reason: &str) {
            self.events.push(format!("stop:{}", reason));
        }
        fn on_data(&mut self, _data: &Value) {
            self.events.push("data".to_string());
        }
        fn on_completion(&mut self, text: &str) {
            self.events.push(format!("completion:{}", text));
        }
        fn on_error(&mut self, error: &ChatCompletionError) {
            self.events.push(format!("error:{}", error.kind));
        }
    }

    #[tokio::test]
    async fn callbacks_fire_in_arrival_order() {
        let stream = openai_sse(&[
            r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"lo"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);

        let mut recorder = Recorder::default();
        let outcome = stream.drive(&mut recorder).await;

        assert_eq!(
            recorder.events,
            ["start", "text:Hel", "text:lo", "stop:stop", "completion:Hello"]
        );
        assert_eq!(outcome, StreamOutcome::Completed { text: "Hello".to_string() });
    }

    #[tokio::test]
    async fn every_chunk_carries_the_stream_id() {
        let stream = openai_sse(&[
            r#"{"choices":[{"index":0,"delta":{"content":"a"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        ]);
        let id = stream.id().clone();

        let chunks: Vec<_> = stream.collect_chunks().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.id == id));
    }

    #[tokio::test]
    async fn read_failure_ends_with_one_classified_error() {
        let parts: Vec<Result<Bytes, ProviderError>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"}}]}\n\n",
            )),
            Err(ProviderError::stream("connection reset")),
            Ok(Bytes::from_static(b"data: {\"never\":true}\n\n")),
        ];
        let stream = ChatStream::from_vendor(
            VendorStream::new(Framing::Sse, ChunkShape::OpenAI, Box::pin(stream::iter(parts))),
            context(),
        );

        let mut recorder = Recorder::default();
        let outcome = stream.drive(&mut recorder).await;

        assert_eq!(
            recorder.events,
            ["start", "text:partial", "error:ProviderUnavailableError"]
        );
        let StreamOutcome::Failed(error) = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(error.kind, ErrorKind::ProviderUnavailable);
        assert_eq!(error.source, ProviderError::stream("connection reset"));
    }

    #[tokio::test]
    async fn anthropic_in_band_error_terminates_stream() {
        let stream = ChatStream::from_vendor(
            VendorStream::new(
                Framing::Sse,
                ChunkShape::Anthropic,
                body([
                    "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
                ]),
            ),
            ErrorContext::new("anthropic", ModelProvider::Anthropic, None),
        );

        let result = stream.collect().await;
        let error = result.unwrap_err();
        assert_eq!(error.provider, "anthropic");
        assert_eq!(error.kind, ErrorKind::ProviderUnavailable);
    }

    #[tokio::test]
    async fn tool_fragments_flush_at_stream_end() {
        let stream = openai_sse(&[
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"add","arguments":"{\"a\":"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]}}]}"#,
        ]);

        let collected = stream.collect().await.unwrap();
        assert_eq!(collected.tool_calls.len(), 1);
        assert_eq!(collected.tool_calls[0].function.arguments, "{\"a\":1}");
    }

    #[tokio::test]
    async fn cancel_inside_callback_stops_everything() {
        let stream = openai_sse(&[
            r#"{"choices":[{"index":0,"delta":{"content":"one"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"two"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        ]);
        let mut recorder = Recorder {
            cancel_after_text: Some(stream.cancel_handle()),
            ..Recorder::default()
        };

        let outcome = stream.drive(&mut recorder).await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(recorder.events, ["start", "text:one"]);
    }

    #[tokio::test]
    async fn cancelled_before_drive_fires_nothing() {
        let stream = openai_sse(&[r#"{"choices":[{"index":0,"delta":{"content":"x"}}]}"#]);
        stream.cancel_handle().cancel();

        let mut recorder = Recorder::default();
        assert_eq!(stream.drive(&mut recorder).await, StreamOutcome::Cancelled);
        assert!(recorder.events.is_empty());
    }

    #[tokio::test]
    async fn cancel_wakes_a_pending_stream() {
        let handle = CancelHandle::new();
        let mut stream = ChatStream::with_cancel(StreamId::new(), stream::pending(), handle.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            handle.cancel();
        });

        assert!(stream.next().await.is_none());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn sse_rendering() {
        let stream = openai_sse(&[r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#]);
        let id = stream.id().to_string();

        let events: Vec<String> = stream.into_sse().collect().await;
        assert_eq!(events, [format!("id: {}\nevent: text\ndata: \"Hi\"\n\n", id)]);
    }

    impl ChatStream {
        async fn collect_chunks(self) -> Vec<StreamProtocolChunk> {
            StreamExt::collect(self).await
        }
    }
}
