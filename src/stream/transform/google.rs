//! Gemini `streamGenerateContent` chunks.

use serde_json::{json, Value};

use super::{first, stop_or_pending, ChunkTransform, Emit, Rule};
use crate::stream::StreamStack;

pub(super) static GOOGLE: ChunkTransform = ChunkTransform::new(
    "google",
    &[],
    &[
        Rule::new("no_candidates", no_candidates),
        Rule::new("text", text),
        Rule::new("function_calls", function_calls),
        Rule::new("finish_reason", finish_reason),
        Rule::new("remaining", remaining),
    ],
);

fn parts(candidate: &Value) -> &[Value] {
    candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn has_function_call(candidate: &Value) -> bool {
    parts(candidate).iter().any(|p| p.get("functionCall").is_some())
}

fn no_candidates(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    match first(chunk, "candidates") {
        Some(_) => None,
        None => Some(Emit::Chunk(stack.data(chunk.clone()))),
    }
}

fn finish_reason_of(candidate: &Value) -> Option<&str> {
    candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .filter(|reason| !reason.is_empty())
}

/// Buffers every `functionCall` part; Gemini sends each call whole.
fn append_function_calls(candidate: &Value, stack: &mut StreamStack) {
    let calls = parts(candidate)
        .iter()
        .filter_map(|part| part.get("functionCall"));
    for call in calls {
        let arguments = call.get("args").cloned().unwrap_or_else(|| json!({}));
        stack.append_tool_call(
            None,
            call.get("name").and_then(Value::as_str).unwrap_or_default(),
            &arguments.to_string(),
        );
    }
}

/// Text, followed by any calls and the finish reason sharing its chunk.
fn text(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let candidate = first(chunk, "candidates")?;
    let texts: Vec<&str> = parts(candidate)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        return None;
    }

    let text = texts.concat();
    let reason = finish_reason_of(candidate);
    let with_calls = has_function_call(candidate);
    if text.is_empty() && (with_calls || reason.is_some()) {
        return None;
    }
    if !with_calls && reason.is_none() {
        return Some(Emit::Chunk(stack.text(text)));
    }

    let mut out: Vec<_> = stack.flush_tool_calls().into_iter().collect();
    out.push(stack.text(text));
    if with_calls {
        append_function_calls(candidate, stack);
    }
    if let Some(reason) = reason {
        out.extend(stack.flush_tool_calls());
        out.push(stack.stop(reason));
    }
    Some(Emit::Chunks(out))
}

fn function_calls(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let candidate = first(chunk, "candidates")?;
    if !has_function_call(candidate) {
        return None;
    }

    append_function_calls(candidate, stack);
    Some(stop_or_pending(stack, finish_reason_of(candidate)))
}

fn finish_reason(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let reason = first(chunk, "candidates")?.get("finishReason")?.as_str()?;
    Some(Emit::Chunk(stack.stop(reason)))
}

fn remaining(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    let candidate = first(chunk, "candidates")?;
    let data = json!({
        "id": stack.id().to_string(),
        "index": candidate.get("index"),
        "content": candidate.get("content"),
    });
    Some(Emit::Chunk(stack.data(data)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::super::ChunkShape;
    use crate::stream::ChunkKind;
    use serde_json::json;

    #[test]
    fn text_parts_become_text() {
        let (id, chunks) = run(
            ChunkShape::Google,
            &[json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]}, "index": 0}]})],
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, id);
        assert_eq!(chunks[0].kind, ChunkKind::Text("Hello".to_string()));
    }

    #[test]
    fn finish_reason_alone_is_stop() {
        let (_, chunks) = run(
            ChunkShape::Google,
            &[json!({"candidates": [{"content": {"role": "model", "parts": [{"text": ""}]}, "finishReason": "STOP", "index": 0}]})],
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Stop("STOP".to_string()));
    }

    #[test]
    fn function_calls_arrive_complete() {
        let (id, chunks) = run(
            ChunkShape::Google,
            &[json!({"candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}}
            ]}, "finishReason": "STOP", "index": 0}]})],
        );

        assert_eq!(chunks.len(), 2);
        let ChunkKind::ToolCalls(calls) = &chunks[0].kind else {
            panic!("expected tool calls, got {:?}", chunks[0].kind);
        };
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(calls[0].parsed_arguments().unwrap(), json!({"city": "Paris"}));
        assert_eq!(calls[0].id, format!("call_{}_0", id));
        assert_eq!(chunks[1].kind, ChunkKind::Stop("STOP".to_string()));
    }

    #[test]
    fn final_text_with_finish_reason_is_text_then_stop() {
        let (_, chunks) = run(
            ChunkShape::Google,
            &[json!({"candidates": [{"content": {"role": "model", "parts": [{"text": " the end."}]}, "finishReason": "MAX_TOKENS", "index": 0}]})],
        );

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::Text(" the end.".to_string()));
        assert_eq!(chunks[1].kind, ChunkKind::Stop("MAX_TOKENS".to_string()));
    }

    #[test]
    fn text_and_call_in_one_chunk_keep_both() {
        let (_, chunks) = run(
            ChunkShape::Google,
            &[json!({"candidates": [{"content": {"role": "model", "parts": [
                {"text": "Checking."},
                {"functionCall": {"name": "lookup", "args": {"q": "rust"}}}
            ]}, "finishReason": "STOP", "index": 0}]})],
        );

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].kind, ChunkKind::Text("Checking.".to_string()));
        let ChunkKind::ToolCalls(calls) = &chunks[1].kind else {
            panic!("expected tool calls, got {:?}", chunks[1].kind);
        };
        assert_eq!(calls[0].function.name, "lookup");
        assert_eq!(chunks[2].kind, ChunkKind::Stop("STOP".to_string()));
    }

    #[test]
    fn calls_in_separate_chunks_stay_separate() {
        let (_, chunks) = run(
            ChunkShape::Google,
            &[
                json!({"candidates": [{"content": {"role": "model", "parts": [
                    {"functionCall": {"name": "a", "args": {"x": 1}}}
                ]}, "index": 0}]}),
                json!({"candidates": [{"content": {"role": "model", "parts": [
                    {"functionCall": {"name": "b", "args": {"y": 2}}}
                ]}, "index": 0}]}),
                json!({"candidates": [{"content": {"role": "model", "parts": [{"text": ""}]}, "finishReason": "STOP", "index": 0}]}),
            ],
        );

        assert_eq!(chunks.len(), 2);
        let ChunkKind::ToolCalls(calls) = &chunks[0].kind else {
            panic!("expected tool calls, got {:?}", chunks[0].kind);
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.name, "a");
        assert_eq!(calls[0].parsed_arguments().unwrap(), json!({"x": 1}));
        assert_eq!(calls[1].function.name, "b");
        assert_eq!(calls[1].parsed_arguments().unwrap(), json!({"y": 2}));
        assert_ne!(calls[0].id, calls[1].id);
        assert_eq!(chunks[1].kind, ChunkKind::Stop("STOP".to_string()));
    }

    #[test]
    fn prompt_feedback_without_candidates_is_data() {
        let original = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let (_, chunks) = run(ChunkShape::Google, &[original.clone()]);
        assert_eq!(chunks[0].kind, ChunkKind::Data(original));
    }
}
