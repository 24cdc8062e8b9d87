//! Protocol transform: vendor chunks to canonical chunks.
//!
//! Each vendor chunk shape has one [`ChunkTransform`]: a list of fields to
//! strip, then an ordered list of [`Rule`]s. The first rule that matches
//! decides what the chunk becomes; a chunk no rule recognizes is passed on as
//! raw data. The rule order is part of each transform's contract and is
//! covered by its tests.
//!
//! Tool calls are the one place where chunks do not map one-to-one. Rules
//! merge tool-call fragments into the [`StreamStack`] and report
//! [`Emit::Pending`]; the [`ProtocolTransformer`] emits the reassembled calls
//! as a single tool-calls chunk right before the next text, stop or
//! [`Emit::Boundary`] chunk, or when the stream ends. Raw data passes through
//! without disturbing the buffer.

mod anthropic;
mod bedrock;
mod google;
mod ollama;
mod openai;

use serde_json::Value;
use std::borrow::Cow;
use tracing::trace;

use super::protocol::{ChunkKind, StreamProtocolChunk, StreamStack};
use crate::llm::ProviderError;
use crate::types::StreamId;

/// Wire shape of the JSON chunks a vendor streams back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkShape {
    /// OpenAI chat completion chunks (`choices[].delta`)
    OpenAI,
    /// Anthropic messages events (`type`-tagged)
    Anthropic,
    /// Gemini `candidates[].content.parts`
    Google,
    /// Ollama `/api/chat` lines
    Ollama,
    /// Anthropic events wrapped by Bedrock
    BedrockAnthropic,
    /// Mistral chat chunks wrapped by Bedrock (`choices[].message`)
    BedrockMistral,
    /// Llama `generation` chunks wrapped by Bedrock
    BedrockLlama,
}

impl ChunkShape {
    /// The transform for this shape.
    #[must_use]
    pub fn transform(self) -> &'static ChunkTransform {
        match self {
            Self::OpenAI => &openai::OPENAI,
            Self::Anthropic => &anthropic::ANTHROPIC,
            Self::Google => &google::GOOGLE,
            Self::Ollama => &ollama::OLLAMA,
            Self::BedrockAnthropic => &bedrock::BEDROCK_ANTHROPIC,
            Self::BedrockMistral => &bedrock::BEDROCK_MISTRAL,
            Self::BedrockLlama => &bedrock::BEDROCK_LLAMA,
        }
    }
}

/// Outcome of a matched rule.
#[derive(Debug)]
pub enum Emit {
    /// One canonical chunk
    Chunk(StreamProtocolChunk),
    /// Several canonical chunks, in order
    Chunks(Vec<StreamProtocolChunk>),
    /// A chunk that closes any buffered tool calls; they are emitted ahead
    /// of it even when it is raw data
    Boundary(StreamProtocolChunk),
    /// The chunk was absorbed into the stack; nothing to emit yet
    Pending,
    /// The vendor reported an error in-band; the stream ends here
    Fault(ProviderError),
}

type RuleFn = fn(&Value, &mut StreamStack) -> Option<Emit>;

/// A named predicate-and-constructor pair.
#[derive(Clone, Copy)]
pub struct Rule {
    /// Rule name, logged on match
    pub name: &'static str,
    apply: RuleFn,
}

impl Rule {
    #[must_use]
    pub const fn new(name: &'static str, apply: RuleFn) -> Self {
        Self { name, apply }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Rule").field(&self.name).finish()
    }
}

/// The ordered rule list for one chunk shape.
#[derive(Debug)]
pub struct ChunkTransform {
    /// Shape name, logged on every match
    pub name: &'static str,
    strip: &'static [&'static str],
    rules: &'static [Rule],
}

impl ChunkTransform {
    #[must_use]
    pub const fn new(
        name: &'static str,
        strip: &'static [&'static str],
        rules: &'static [Rule],
    ) -> Self {
        Self { name, strip, rules }
    }

    /// Top-level fields removed before any rule looks at a chunk.
    #[must_use]
    pub fn stripped_fields(&self) -> &'static [&'static str] {
        self.strip
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.name)
    }

    /// Classifies one vendor chunk.
    pub fn apply(&self, chunk: &Value, stack: &mut StreamStack) -> Emit {
        let chunk = self.strip_fields(chunk);

        for rule in self.rules {
            if let Some(emit) = (rule.apply)(&*chunk, stack) {
                trace!(transform = self.name, rule = rule.name, "chunk matched");
                return emit;
            }
        }

        trace!(transform = self.name, "no rule matched, passing through");
        Emit::Chunk(stack.data(chunk.into_owned()))
    }

    fn strip_fields<'a>(&self, chunk: &'a Value) -> Cow<'a, Value> {
        let Some(object) = chunk.as_object() else {
            return Cow::Borrowed(chunk);
        };
        if !self.strip.iter().any(|field| object.contains_key(*field)) {
            return Cow::Borrowed(chunk);
        }

        let mut object = object.clone();
        for field in self.strip {
            object.remove(*field);
        }
        Cow::Owned(Value::Object(object))
    }
}

/// Drives one stream's chunks through a transform.
///
/// Owns the stream's [`StreamStack`]; dropping the transformer drops any
/// buffered tool-call fragments with it.
#[derive(Debug)]
pub struct ProtocolTransformer {
    transform: &'static ChunkTransform,
    stack: StreamStack,
}

impl ProtocolTransformer {
    /// Creates the transformer for a new stream.
    #[must_use]
    pub fn new(shape: ChunkShape, id: StreamId) -> Self {
        Self {
            transform: shape.transform(),
            stack: StreamStack::new(id),
        }
    }

    /// The stream's id.
    #[must_use]
    pub fn id(&self) -> &StreamId {
        self.stack.id()
    }

    /// Transforms one vendor chunk into zero or more canonical chunks.
    ///
    /// Buffered tool calls completed by this chunk come out first.
    ///
    /// # Errors
    ///
    /// Returns the vendor's error when the chunk is an in-band error event.
    pub fn push(&mut self, chunk: &Value) -> Result<Vec<StreamProtocolChunk>, ProviderError> {
        let (closes_tool_calls, chunks) = match self.transform.apply(chunk, &mut self.stack) {
            Emit::Pending => return Ok(Vec::new()),
            Emit::Fault(error) => return Err(error),
            Emit::Chunk(chunk) => (!is_data(&chunk), vec![chunk]),
            Emit::Chunks(chunks) => (chunks.iter().any(|c| !is_data(c)), chunks),
            Emit::Boundary(chunk) => (true, vec![chunk]),
        };

        let mut out = Vec::with_capacity(chunks.len() + 1);
        if closes_tool_calls {
            out.extend(self.stack.flush_tool_calls());
        }
        out.extend(chunks);
        Ok(out)
    }

    /// Emits tool calls still buffered when the vendor stream ends.
    pub fn finish(&mut self) -> Option<StreamProtocolChunk> {
        self.stack.flush_tool_calls()
    }
}

// =============================================================================
// Helpers shared by the per-shape rules
// =============================================================================

/// Raw data never closes buffered tool calls: vendors interleave keep-alive
/// and lifecycle events with argument fragments.
fn is_data(chunk: &StreamProtocolChunk) -> bool {
    matches!(chunk.kind, ChunkKind::Data(_))
}

/// First element of the array at `key`.
fn first<'a>(chunk: &'a Value, key: &str) -> Option<&'a Value> {
    chunk.get(key)?.as_array()?.first()
}

/// True when `value` carries something: not null, not an empty string, not
/// an empty array.
fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Text rule for shapes that put text, tool calls and stop reasons side by
/// side. Empty text is still emitted, unless the same chunk carries tool
/// calls or a stop reason for a later rule to pick up.
fn text_unless_superseded(
    stack: &StreamStack,
    text: Option<&str>,
    superseded: bool,
) -> Option<Emit> {
    let text = text?;
    if text.is_empty() && superseded {
        return None;
    }
    Some(Emit::Chunk(stack.text(text)))
}

/// Function-call arguments as JSON text; vendors send either a string or an
/// object.
fn arguments_text(arguments: Option<&Value>) -> String {
    match arguments {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// After merging complete tool calls: emit the stop reason now (the calls
/// are flushed ahead of it), or wait for the next chunk.
fn stop_or_pending(stack: &StreamStack, reason: Option<&str>) -> Emit {
    match reason {
        Some(reason) => Emit::Chunk(stack.stop(reason)),
        None => Emit::Pending,
    }
}
