//! Model chunks as delivered through Bedrock's response stream.
//!
//! Bedrock appends an `amazon-bedrock-invocationMetrics` object to the last
//! chunk of every stream; all three transforms strip it before any rule
//! runs.

use serde_json::{json, Value};

use super::{
    anthropic, arguments_text, first, present, stop_or_pending, text_unless_superseded,
    ChunkTransform, Emit, Rule,
};
use crate::stream::StreamStack;

const INVOCATION_METRICS: &[&str] = &["amazon-bedrock-invocationMetrics"];

pub(super) static BEDROCK_ANTHROPIC: ChunkTransform =
    ChunkTransform::new("bedrock-anthropic", INVOCATION_METRICS, anthropic::RULES);

// =============================================================================
// Mistral
// =============================================================================

pub(super) static BEDROCK_MISTRAL: ChunkTransform = ChunkTransform::new(
    "bedrock-mistral",
    INVOCATION_METRICS,
    &[
        Rule::new("no_choices", mistral_no_choices),
        Rule::new("text", mistral_text),
        Rule::new("tool_calls", mistral_tool_calls),
        Rule::new("stop_reason", mistral_stop_reason),
        Rule::new("remaining", mistral_remaining),
    ],
);

fn mistral_no_choices(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    match first(chunk, "choices") {
        Some(_) => None,
        None => Some(Emit::Chunk(stack.data(chunk.clone()))),
    }
}

fn mistral_text(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let choice = first(chunk, "choices")?;
    let superseded =
        present(choice.pointer("/message/tool_calls")) || present(choice.get("stop_reason"));
    text_unless_superseded(
        stack,
        choice.pointer("/message/content").and_then(Value::as_str),
        superseded,
    )
}

fn mistral_tool_calls(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let choice = first(chunk, "choices")?;
    let calls = choice.pointer("/message/tool_calls")?.as_array()?;
    if calls.is_empty() {
        return None;
    }

    for call in calls {
        stack.append_tool_call(
            call.get("id").and_then(Value::as_str),
            call.pointer("/function/name").and_then(Value::as_str).unwrap_or_default(),
            &arguments_text(call.pointer("/function/arguments")),
        );
    }

    let reason = choice.get("stop_reason").and_then(Value::as_str);
    Some(stop_or_pending(stack, reason))
}

fn mistral_stop_reason(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let reason = first(chunk, "choices")?.get("stop_reason")?.as_str()?;
    Some(Emit::Chunk(stack.stop(reason)))
}

fn mistral_remaining(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let choice = first(chunk, "choices")?;
    let data = json!({
        "id": stack.id().to_string(),
        "index": choice.get("index"),
        "message": choice.get("message"),
    });
    Some(Emit::Chunk(stack.data(data)))
}

// =============================================================================
// Llama
// =============================================================================

pub(super) static BEDROCK_LLAMA: ChunkTransform = ChunkTransform::new(
    "bedrock-llama",
    INVOCATION_METRICS,
    &[
        Rule::new("generation", llama_generation),
        Rule::new("stop_reason", llama_stop_reason),
    ],
);

fn llama_generation(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    text_unless_superseded(
        stack,
        chunk.get("generation").and_then(Value::as_str),
        present(chunk.get("stop_reason")),
    )
}

fn llama_stop_reason(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let reason = chunk.get("stop_reason")?.as_str()?;
    Some(Emit::Chunk(stack.stop(reason)))
}
