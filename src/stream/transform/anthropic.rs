//! Anthropic messages stream events.
//!
//! Events are tagged by `type`: `message_start`, `content_block_start`,
//! `content_block_delta`, `content_block_stop`, `message_delta`,
//! `message_stop`, `ping` and `error`. Only text deltas, tool-use blocks,
//! the stop reason and errors are interpreted; every other event is passed
//! on as data.

use serde_json::Value;

use super::{ChunkTransform, Emit, Rule};
use crate::llm::ProviderError;
use crate::stream::StreamStack;

pub(super) const RULES: &[Rule] = &[
    Rule::new("untyped", untyped),
    Rule::new("text_delta", text_delta),
    Rule::new("tool_use_start", tool_use_start),
    Rule::new("input_json_delta", input_json_delta),
    Rule::new("block_stop", block_stop),
    Rule::new("stop_reason", stop_reason),
    Rule::new("error", error),
];

pub(super) static ANTHROPIC: ChunkTransform = ChunkTransform::new("anthropic", &[], RULES);

fn event_type(chunk: &Value) -> Option<&str> {
    chunk.get("type").and_then(Value::as_str)
}

fn block_index(chunk: &Value) -> usize {
    chunk.get("index").and_then(Value::as_u64).unwrap_or(0) as usize
}

fn untyped(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    match event_type(chunk) {
        Some(_) => None,
        None => Some(Emit::Chunk(stack.data(chunk.clone()))),
    }
}

fn text_delta(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if event_type(chunk) != Some("content_block_delta")
        || chunk.pointer("/delta/type").and_then(Value::as_str) != Some("text_delta")
    {
        return None;
    }
    let text = chunk.pointer("/delta/text").and_then(Value::as_str)?;
    Some(Emit::Chunk(stack.text(text)))
}

fn tool_use_start(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if event_type(chunk) != Some("content_block_start") {
        return None;
    }
    let block = chunk.get("content_block")?;
    if block.get("type").and_then(Value::as_str) != Some("tool_use") {
        return None;
    }

    // Non-streamed input arrives whole on the start block; streamed input
    // starts as `{}` and is replaced by the deltas that follow.
    let input = block
        .get("input")
        .filter(|input| input.as_object().is_some_and(|o| !o.is_empty()))
        .map(Value::to_string);

    stack.merge_tool_fragment(
        block_index(chunk),
        block.get("id").and_then(Value::as_str),
        block.get("name").and_then(Value::as_str),
        input.as_deref(),
    );
    Some(Emit::Pending)
}

fn input_json_delta(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if event_type(chunk) != Some("content_block_delta")
        || chunk.pointer("/delta/type").and_then(Value::as_str) != Some("input_json_delta")
    {
        return None;
    }

    stack.merge_tool_fragment(
        block_index(chunk),
        None,
        None,
        chunk.pointer("/delta/partial_json").and_then(Value::as_str),
    );
    Some(Emit::Pending)
}

/// A finished block completes any tool input streamed into it.
fn block_stop(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if event_type(chunk) != Some("content_block_stop") {
        return None;
    }
    Some(Emit::Boundary(stack.data(chunk.clone())))
}

fn stop_reason(chunk: &Value, stack: &mut StreamStack) -> Option<Emit> {
    if event_type(chunk) != Some("message_delta") {
        return None;
    }
    let reason = chunk.pointer("/delta/stop_reason")?.as_str()?;
    Some(Emit::Chunk(stack.stop(reason)))
}

fn error(chunk: &Value, _stack: &mut StreamStack) -> Option<Emit> {
    if event_type(chunk) != Some("error") {
        return None;
    }
    let error_type = chunk
        .pointer("/error/type")
        .and_then(Value::as_str)
        .unwrap_or("error");
    let message = chunk
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(Emit::Fault(ProviderError::vendor(error_type, message)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::super::{ChunkShape, ProtocolTransformer};
    use crate::llm::ProviderError;
    use crate::stream::ChunkKind;
    use crate::types::StreamId;
    use serde_json::json;

    #[test]
    fn text_delta_becomes_text() {
        let (id, chunks) = run(
            ChunkShape::Anthropic,
            &[json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}})],
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, id);
        assert_eq!(chunks[0].kind, ChunkKind::Text("Hello".to_string()));
    }

    #[test]
    fn message_delta_with_stop_reason_is_stop() {
        let (_, chunks) = run(
            ChunkShape::Anthropic,
            &[json!({"type": "message_delta", "delta": {"stop_reason": "end_turn", "stop_sequence": null}, "usage": {"output_tokens": 15}})],
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Stop("end_turn".to_string()));
    }

    #[test]
    fn tool_use_blocks_reassemble() {
        let (_, chunks) = run(
            ChunkShape::Anthropic,
            &[
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_01", "name": "get_weather", "input": {}}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": ""}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"location\": \"San"}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": " Francisco\"}"}}),
                json!({"type": "content_block_stop", "index": 1}),
                json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}),
            ],
        );

        assert_eq!(chunks.len(), 3);
        let ChunkKind::ToolCalls(calls) = &chunks[0].kind else {
            panic!("expected tool calls, got {:?}", chunks[0].kind);
        };
        assert_eq!(calls[0].id, "toolu_01");
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(calls[0].function.arguments, "{\"location\": \"San Francisco\"}");
        assert_eq!(calls[0].index, 0);
        assert_eq!(
            chunks[1].kind,
            ChunkKind::Data(json!({"type": "content_block_stop", "index": 1}))
        );
        assert_eq!(chunks[2].kind, ChunkKind::Stop("tool_use".to_string()));
    }

    #[test]
    fn ping_between_input_fragments_keeps_one_call() {
        let (_, chunks) = run(
            ChunkShape::Anthropic,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_01", "name": "get_weather", "input": {}}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"location\": \"San"}}),
                json!({"type": "ping"}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": " Francisco\"}"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}),
            ],
        );

        let calls: Vec<_> = chunks
            .iter()
            .filter_map(|chunk| match &chunk.kind {
                ChunkKind::ToolCalls(calls) => Some(calls),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_01");
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(
            calls[0].parsed_arguments().unwrap(),
            json!({"location": "San Francisco"})
        );

        assert_eq!(chunks[0].kind, ChunkKind::Data(json!({"type": "ping"})));
        assert!(matches!(chunks[1].kind, ChunkKind::ToolCalls(_)));
        assert_eq!(chunks.last().unwrap().kind, ChunkKind::Stop("tool_use".to_string()));
    }

    #[test]
    fn lifecycle_events_pass_through_as_data() {
        let start = json!({"type": "message_start", "message": {"id": "msg_1", "role": "assistant", "content": []}});
        let (_, chunks) = run(ChunkShape::Anthropic, &[start.clone(), json!({"type": "ping"})]);

        assert_eq!(chunks[0].kind, ChunkKind::Data(start));
        assert_eq!(chunks[1].kind, ChunkKind::Data(json!({"type": "ping"})));
    }

    #[test]
    fn untyped_chunk_is_data() {
        let original = json!({"unexpected": true});
        let (_, chunks) = run(ChunkShape::Anthropic, &[original.clone()]);
        assert_eq!(chunks[0].kind, ChunkKind::Data(original));
    }

    #[test]
    fn error_event_faults_the_stream() {
        let mut transformer = ProtocolTransformer::new(ChunkShape::Anthropic, StreamId::new());
        let result = transformer.push(&json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        }));

        assert_eq!(
            result.unwrap_err(),
            ProviderError::vendor("overloaded_error", "Overloaded")
        );
    }
}
