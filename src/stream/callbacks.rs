//! Consumer-side handling of canonical streams.
//!
//! Implement [`ChatStreamCallbacks`] to receive chunks as they arrive, or
//! collect a whole stream into a [`CollectedResponse`].
//!
//! # Example
//!
//! ```rust
//! use agent_runtime::stream::ChatStreamCallbacks;
//!
//! #[derive(Default)]
//! struct WordCounter {
//!     words: usize,
//! }
//!
//! impl ChatStreamCallbacks for WordCounter {
//!     fn on_text(&mut self, text: &str) {
//!         self.words += text.split_whitespace().count();
//!     }
//!
//!     fn on_completion(&mut self, text: &str) {
//!         println!("{} words in {} bytes", self.words, text.len());
//!     }
//! }
//! ```

use crate::error::ChatCompletionError;
use crate::types::StreamId;

use super::ToolCallChunk;

/// Handler invoked for each canonical chunk, in arrival order.
///
/// Every hook has an empty default. For one stream, `on_start` fires first,
/// and exactly one of `on_completion` or `on_error` fires last, unless the
/// stream is cancelled, in which case nothing fires after the cancel.
pub trait ChatStreamCallbacks: Send {
    /// The stream was opened; called once, before any other hook.
    fn on_start(&mut self, _id: &StreamId) {}

    /// A text delta; may be empty or whitespace.
    fn on_text(&mut self, _text: &str) {}

    /// Complete tool calls, arguments fully reassembled.
    fn on_tool_calls(&mut self, _calls: &[ToolCallChunk]) {}

    /// The vendor's stop or finish reason, verbatim.
    fn on_stop(&mut self, _reason: &str) {}

    /// A chunk the transform did not interpret.
    fn on_data(&mut self, _data: &serde_json::Value) {}

    /// The stream ended normally.
    ///
    /// # Arguments
    ///
    /// * `text` - All text deltas of the stream, concatenated
    fn on_completion(&mut self, _text: &str) {}

    /// The stream ended with an error. Text already delivered stays valid.
    fn on_error(&mut self, _error: &ChatCompletionError) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl ChatStreamCallbacks for NoopCallbacks {}

/// A stream gathered into one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedResponse {
    /// All text deltas, concatenated.
    pub text: String,

    /// Every tool call the model requested.
    pub tool_calls: Vec<ToolCallChunk>,

    /// The last stop reason seen, if any.
    pub stop_reason: Option<String>,

    /// Number of text deltas received.
    pub delta_count: usize,
}

impl CollectedResponse {
    /// Returns true if the model wants to call tools.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Returns true if the vendor reported hitting the token limit.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(
            self.stop_reason.as_deref(),
            Some("length" | "max_tokens" | "MAX_TOKENS")
        )
    }
}

impl ChatStreamCallbacks for CollectedResponse {
    fn on_text(&mut self, text: &str) {
        self.text.push_str(text);
        self.delta_count += 1;
    }

    fn on_tool_calls(&mut self, calls: &[ToolCallChunk]) {
        self.tool_calls.extend_from_slice(calls);
    }

    fn on_stop(&mut self, reason: &str) {
        self.stop_reason = Some(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collected_response_accumulates() {
        let mut collected = CollectedResponse::default();
        collected.on_text("Hello");
        collected.on_text(", world");
        collected.on_tool_calls(&[ToolCallChunk::function("c1", 0, "f", "{}")]);
        collected.on_stop("length");

        assert_eq!(collected.text, "Hello, world");
        assert_eq!(collected.delta_count, 2);
        assert!(collected.has_tool_calls());
        assert!(collected.is_truncated());
    }

    #[test]
    fn stop_reasons_other_than_limits_are_not_truncation() {
        let collected = CollectedResponse {
            stop_reason: Some("end_turn".to_string()),
            ..CollectedResponse::default()
        };
        assert!(!collected.is_truncated());
    }
}
