//! The canonical chunk protocol and per-stream accumulator state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ChatCompletionError;
use crate::types::StreamId;

/// One normalized unit of a chat stream.
///
/// Every adapter's output, whatever its wire format, ends up as a sequence
/// of these.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProtocolChunk {
    /// The stream this chunk belongs to
    pub id: StreamId,
    /// What the chunk carries
    pub kind: ChunkKind,
}

/// The closed set of chunk kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkKind {
    /// Incremental text; may be empty
    Text(String),
    /// Complete tool calls, arguments fully reassembled
    ToolCalls(Vec<ToolCallChunk>),
    /// Vendor stop or finish reason, verbatim
    Stop(String),
    /// Anything not recognized as content, passed through untouched
    Data(Value),
    /// Terminal failure; nothing follows it
    Error(ChatCompletionError),
}

impl ChunkKind {
    /// Event name used on the SSE protocol.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::ToolCalls(_) => "tool_calls",
            Self::Stop(_) => "stop",
            Self::Data(_) => "data",
            Self::Error(_) => "error",
        }
    }
}

impl StreamProtocolChunk {
    /// Returns true for the terminal error chunk.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ChunkKind::Error(_))
    }

    /// The chunk's payload as JSON.
    #[must_use]
    pub fn data(&self) -> Value {
        match &self.kind {
            ChunkKind::Text(text) => Value::String(text.clone()),
            ChunkKind::ToolCalls(calls) => {
                serde_json::to_value(calls).unwrap_or(Value::Array(Vec::new()))
            }
            ChunkKind::Stop(reason) => Value::String(reason.clone()),
            ChunkKind::Data(value) => value.clone(),
            ChunkKind::Error(error) => {
                serde_json::to_value(error.to_payload()).unwrap_or(Value::Null)
            }
        }
    }

    /// Renders the chunk as one server-sent event for the consumer layer.
    ///
    /// ```
    /// use agent_runtime::stream::StreamStack;
    /// use agent_runtime::types::StreamId;
    ///
    /// let stack = StreamStack::new(StreamId::new());
    /// let sse = stack.text("Hi").to_sse();
    /// assert!(sse.contains("event: text\ndata: \"Hi\"\n\n"));
    /// ```
    #[must_use]
    pub fn to_sse(&self) -> String {
        format!(
            "id: {}\nevent: {}\ndata: {}\n\n",
            self.id,
            self.kind.event_name(),
            self.data()
        )
    }
}

/// A complete tool call as emitted on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    /// Vendor call id, or a generated one when the vendor sends none
    pub id: String,
    /// Position among the calls of this response
    pub index: usize,
    /// Always `function`
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function to invoke
    pub function: ToolCallFunction,
}

/// Function name and JSON-encoded arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments as a JSON document, exactly as the vendor produced them
    pub arguments: String,
}

impl ToolCallChunk {
    /// Creates a function tool call.
    #[must_use]
    pub fn function(
        id: impl Into<String>,
        index: usize,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            index,
            call_type: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parses the arguments document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the vendor produced invalid arguments.
    pub fn parsed_arguments(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.function.arguments)
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Per-stream state threaded through the protocol transform.
///
/// Owns the stream id and the buffers of tool calls whose arguments are
/// still arriving. Exactly one stream owns a stack; it is dropped with the
/// stream.
#[derive(Debug)]
pub struct StreamStack {
    id: StreamId,
    pending: BTreeMap<usize, PendingToolCall>,
    tool_calls_emitted: usize,
}

impl StreamStack {
    /// Creates the state for a new stream.
    #[must_use]
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            pending: BTreeMap::new(),
            tool_calls_emitted: 0,
        }
    }

    /// The stream's id.
    #[must_use]
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Wraps `kind` in a chunk tagged with this stream's id.
    #[must_use]
    pub fn chunk(&self, kind: ChunkKind) -> StreamProtocolChunk {
        StreamProtocolChunk {
            id: self.id.clone(),
            kind,
        }
    }

    #[must_use]
    pub fn text(&self, text: impl Into<String>) -> StreamProtocolChunk {
        self.chunk(ChunkKind::Text(text.into()))
    }

    #[must_use]
    pub fn stop(&self, reason: impl Into<String>) -> StreamProtocolChunk {
        self.chunk(ChunkKind::Stop(reason.into()))
    }

    #[must_use]
    pub fn data(&self, value: Value) -> StreamProtocolChunk {
        self.chunk(ChunkKind::Data(value))
    }

    /// Emits tool calls that arrived complete, numbering them after any
    /// calls already emitted on this stream.
    #[must_use]
    pub fn tool_calls(&mut self, calls: Vec<(Option<String>, String, String)>) -> StreamProtocolChunk {
        let mut chunks = Vec::with_capacity(calls.len());
        for (id, name, arguments) in calls {
            let index = self.tool_calls_emitted;
            self.tool_calls_emitted += 1;
            let id = id.unwrap_or_else(|| format!("call_{}_{}", self.id, index));
            chunks.push(ToolCallChunk::function(id, index, name, arguments));
        }
        self.chunk(ChunkKind::ToolCalls(chunks))
    }

    /// Merges one tool-call fragment into the buffer for `index`.
    ///
    /// The first fragment for an index usually carries the id and name;
    /// later ones carry argument text, appended in arrival order.
    pub fn merge_tool_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let entry = self.pending.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            entry.id = Some(id.to_string());
        }
        if let Some(name) = name {
            entry.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(arguments);
        }
    }

    /// Buffers a call that arrived whole, after every call already pending.
    ///
    /// Vendors that send complete calls number them per chunk, so their
    /// indices cannot key the buffer.
    pub fn append_tool_call(&mut self, id: Option<&str>, name: &str, arguments: &str) {
        let index = self
            .pending
            .keys()
            .next_back()
            .map_or(0, |last| last + 1);
        self.merge_tool_fragment(index, id, Some(name), Some(arguments));
    }

    /// Returns true while tool-call fragments are buffered.
    #[must_use]
    pub fn has_pending_tool_calls(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drains the buffered tool calls into one complete tool-calls chunk.
    ///
    /// Calls are ordered by vendor index. A call whose arguments never
    /// arrived gets `{}`.
    pub fn flush_tool_calls(&mut self) -> Option<StreamProtocolChunk> {
        if self.pending.is_empty() {
            return None;
        }

        let pending = std::mem::take(&mut self.pending);
        let calls = pending
            .into_values()
            .map(|call| {
                let arguments = if call.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                };
                (call.id, call.name, arguments)
            })
            .collect();
        Some(self.tool_calls(calls))
    }
}
