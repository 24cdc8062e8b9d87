//! Ollama `/api/chat` lines.
//!
//! ```text
//! {"model":"llama3","message":{"role":"assistant","content":"Hi"},"done":false}
//! {"model":"llama3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}
//! ```

use serde_json::Value;

use super::{arguments_text, present, stop_or_pending, text_unless_superseded, ChunkTransform, Emit, Rule};
use crate::stream::StreamStack;

pub(super) static OLLAMA: ChunkTransform = ChunkTransform::new(
    "ollama",
    &[],
    &[
        Rule::new("no_message", no_message),
        Rule::new("text", text),
        Rule::new("tool_calls", tool_calls),
        Rule::new("done", done),
    ],
);

fn is_done(chunk: &Value) -> bool {
    chunk.get("done").and_then(Value::as_bool) == Some(true)
}

fn done_reason(chunk: &Value) -> &str {
    chunk
        .get("done_reason")
        .and_then(Value::as_str)
        .unwrap_or("stop")
}

fn no_message(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if chunk.get("message").is_some_and(Value::is_object) {
        return None;
    }
    Some(Emit::Chunk(stack.data(chunk.clone())))
}

fn text(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let message = chunk.get("message")?;
    let superseded = present(message.get("tool_calls")) || is_done(chunk);
    text_unless_superseded(
        stack,
        message.get("content").and_then(Value::as_str),
        superseded,
    )
}

fn tool_calls(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let calls = chunk.pointer("/message/tool_calls")?.as_array()?;
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

    let reason = is_done(chunk).then(|| done_reason(chunk));
    Some(stop_or_pending(stack, reason))
}

fn done(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if !is_done(chunk) {
        return None;
    }
    Some(Emit::Chunk(stack.stop(done_reason(chunk))))
}
