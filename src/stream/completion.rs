//! Folding of non-streaming response bodies into a [`CompletionResult`].

use serde_json::Value;

use super::transform::ChunkShape;
use super::ToolCallChunk;
use crate::llm::ProviderError;
use crate::messages::CompletionResult;

/// Normalizes a complete (non-streamed) vendor response body.
///
/// # Errors
///
/// Returns a parse error when the body carries no choice or candidate to
/// read a completion from.
pub fn completion_from(shape: ChunkShape, body: &Value) -> Result<CompletionResult, ProviderError> {
    match shape {
        ChunkShape::OpenAI | ChunkShape::BedrockMistral => openai_style(body),
        ChunkShape::Anthropic | ChunkShape::BedrockAnthropic => Ok(anthropic(body)),
        ChunkShape::Google => google(body),
        ChunkShape::Ollama => ollama(body),
        ChunkShape::BedrockLlama => Ok(CompletionResult {
            text: str_at(body, "/generation").to_string(),
            tool_calls: Vec::new(),
            stop_reason: opt_str_at(body, "/stop_reason"),
        }),
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn opt_str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn arguments(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) | Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    }
}

fn tool_call(index: usize, id: Option<&str>, name: &str, args: Option<&Value>) -> ToolCallChunk {
    let id = id.map_or_else(|| format!("call_{index}"), str::to_string);
    ToolCallChunk::function(id, index, name, arguments(args))
}

fn function_calls(calls: Option<&Value>) -> Vec<ToolCallChunk> {
    calls
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(index, call)| {
            tool_call(
                index,
                call.get("id").and_then(Value::as_str),
                str_at(call, "/function/name"),
                call.pointer("/function/arguments"),
            )
        })
        .collect()
}

fn openai_style(body: &Value) -> Result<CompletionResult, ProviderError> {
    let choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| ProviderError::parse("response contained no choices"))?;

    Ok(CompletionResult {
        text: str_at(choice, "/message/content").to_string(),
        tool_calls: function_calls(choice.pointer("/message/tool_calls")),
        stop_reason: opt_str_at(choice, "/finish_reason")
            .or_else(|| opt_str_at(choice, "/stop_reason")),
    })
}

fn anthropic(body: &Value) -> CompletionResult {
    let mut result = CompletionResult {
        stop_reason: opt_str_at(body, "/stop_reason"),
        ..CompletionResult::default()
    };

    let blocks = body.get("content").and_then(Value::as_array);
    for block in blocks.into_iter().flatten() {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => result.text.push_str(str_at(block, "/text")),
            Some("tool_use") => {
                let index = result.tool_calls.len();
                result.tool_calls.push(tool_call(
                    index,
                    block.get("id").and_then(Value::as_str),
                    str_at(block, "/name"),
                    block.get("input"),
                ));
            }
            _ => {}
        }
    }
    result
}

fn google(body: &Value) -> Result<CompletionResult, ProviderError> {
    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| ProviderError::parse("response contained no candidates"))?;

    let mut result = CompletionResult {
        stop_reason: opt_str_at(candidate, "/finishReason"),
        ..CompletionResult::default()
    };

    let parts = candidate.pointer("/content/parts").and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            result.text.push_str(text);
        } else if let Some(call) = part.get("functionCall") {
            let index = result.tool_calls.len();
            result
                .tool_calls
                .push(tool_call(index, None, str_at(call, "/name"), call.get("args")));
        }
    }
    Ok(result)
}

fn ollama(body: &Value) -> Result<CompletionResult, ProviderError> {
    let message = body
        .get("message")
        .ok_or_else(|| ProviderError::parse("response contained no message"))?;

    Ok(CompletionResult {
        text: str_at(message, "/content").to_string(),
        tool_calls: function_calls(message.get("tool_calls")),
        stop_reason: opt_str_at(body, "/done_reason"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openai_completion_with_tool_calls() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"rust\"}"}}]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let result = completion_from(ChunkShape::OpenAI, &body).unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].id, "call_1");
        assert_eq!(result.stop_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn openai_without_choices_is_parse_error() {
        let error = completion_from(ChunkShape::OpenAI, &json!({"object": "list"})).unwrap_err();
        assert_eq!(error, ProviderError::parse("response contained no choices"));
    }

    #[test]
    fn anthropic_joins_text_blocks_and_collects_tool_use() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Let me check. "},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Oslo"}},
            ],
            "stop_reason": "tool_use"
        });

        let result = completion_from(ChunkShape::Anthropic, &body).unwrap();
        assert_eq!(result.text, "Let me check. ");
        assert_eq!(result.tool_calls[0].parsed_arguments().unwrap(), json!({"city": "Oslo"}));
        assert_eq!(result.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn google_function_call_gets_generated_id() {
        let body = json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "now", "args": {}}}
        ]}, "finishReason": "STOP"}]});

        let result = completion_from(ChunkShape::Google, &body).unwrap();
        assert_eq!(result.tool_calls[0].id, "call_0");
        assert_eq!(result.tool_calls[0].function.arguments, "{}");
    }

    #[test]
    fn ollama_and_llama_text() {
        let ollama = json!({"message": {"role": "assistant", "content": "hey"}, "done": true, "done_reason": "stop"});
        assert_eq!(completion_from(ChunkShape::Ollama, &ollama).unwrap().text, "hey");

        let llama = json!({"generation": "hello", "stop_reason": "stop"});
        let result = completion_from(ChunkShape::BedrockLlama, &llama).unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.stop_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn bedrock_mistral_reads_stop_reason() {
        let body = json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "stop_reason": "stop"}]});
        let result = completion_from(ChunkShape::BedrockMistral, &body).unwrap();
        assert_eq!(result.text, "ok");
        assert_eq!(result.stop_reason.as_deref(), Some("stop"));
    }
}
