//! OpenAI chat completion chunks, shared by every OpenAI-compatible vendor.
//!
//! ```text
//! {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}
//! ```

use serde_json::{json, Value};

use super::{first, present, stop_or_pending, text_unless_superseded, ChunkTransform, Emit, Rule};
use crate::stream::StreamStack;

pub(super) static OPENAI: ChunkTransform = ChunkTransform::new(
    "openai",
    &[],
    &[
        Rule::new("no_choices", no_choices),
        Rule::new("text", text),
        Rule::new("tool_call_fragments", tool_call_fragments),
        Rule::new("finish_reason", finish_reason),
        Rule::new("remaining", remaining),
    ],
);

fn no_choices(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    match first(chunk, "choices") {
        Some(_) => None,
        None => Some(Emit::Chunk(stack.data(chunk.clone()))),
    }
}

fn text(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let choice = first(chunk, "choices")?;
    let content = choice
        .pointer("/delta/content")
        .or_else(|| choice.pointer("/message/content"))
        .and_then(Value::as_str);
    let superseded =
        present(choice.pointer("/delta/tool_calls")) || present(choice.get("finish_reason"));
    text_unless_superseded(stack, content, superseded)
}

fn tool_call_fragments(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let choice = first(chunk, "choices")?;
    let fragments = choice.pointer("/delta/tool_calls")?.as_array()?;
    if fragments.is_empty() {
        return None;
    }

    for (position, fragment) in fragments.iter().enumerate() {
        let index = fragment
            .get("index")
            .and_then(Value::as_u64)
            .map_or(position, |i| i as usize);
        stack.merge_tool_fragment(
            index,
            fragment.get("id").and_then(Value::as_str),
            fragment.pointer("/function/name").and_then(Value::as_str),
            fragment.pointer("/function/arguments").and_then(Value::as_str),
        );
    }

    let reason = choice.get("finish_reason").and_then(Value::as_str);
    Some(stop_or_pending(stack, reason))
}

fn finish_reason(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let reason = first(chunk, "choices")?.get("finish_reason")?.as_str()?;
    Some(Emit::Chunk(stack.stop(reason)))
}

fn remaining(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let choice = first(chunk, "choices")?;
    let data = json!({
        "id": stack.id().to_string(),
        "index": choice.get("index"),
        "delta": choice.get("delta"),
    });
    Some(Emit::Chunk(stack.data(data)))
}
