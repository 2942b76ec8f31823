//! OpenAI Chat Completions stream adapter
//!
//! Tool calls arrive as index-keyed deltas with no per-call stop event, so
//! every call seen is stopped when the choice reports a finish reason.

use super::adapter::{null_as_default, parse_envelope, StreamAdapter, TranslateError};
use crate::decode::{DecodeSkew, DecoderInput, DecoderPolicy, SlotKey, TransportError};
use crate::protocol::ProviderKind;
use crate::usage::{extract, OpenAiUsage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

/// Key for the assistant text run; tool calls use their index
fn text_key() -> SlotKey {
    SlotKey::Id("content".to_string())
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<OpenAiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

impl From<OpenAiErrorBody> for TransportError {
    fn from(body: OpenAiErrorBody) -> Self {
        let code = match body.code {
            Some(Value::String(code)) => code,
            Some(Value::Number(code)) => code.to_string(),
            _ => body.kind.unwrap_or_else(|| "unknown".to_string()),
        };
        match code.as_str() {
            "rate_limit_exceeded" | "429" => TransportError::RateLimit {
                message: body.message,
                retry_after: None,
            },
            "server_error" | "500" | "503" => TransportError::ServiceUnavailable(body.message),
            "invalid_api_key" | "401" => TransportError::Authentication(body.message),
            _ => TransportError::Provider {
                code,
                message: body.message,
            },
        }
    }
}

/// Non-streaming Chat Completions response
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    tool_calls: Vec<CompletionToolCall>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CompletionToolCall {
    id: String,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize, Serialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Chat Completions stream adapter
#[derive(Debug, Default)]
pub struct OpenAiAdapter {
    started: BTreeSet<u32>,
    stopped: BTreeSet<u32>,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn translate_choice(&mut self, choice: ChunkChoice, inputs: &mut Vec<DecoderInput>) {
        if let Some(text) = choice.delta.content {
            inputs.push(DecoderInput::text(text_key(), text));
        }

        for call in choice.delta.tool_calls {
            let key = SlotKey::Index(call.index);
            let function = call.function.unwrap_or_default();
            if self.started.insert(call.index) || call.id.is_some() || function.name.is_some() {
                inputs.push(DecoderInput::tool_start(key.clone(), call.id, function.name));
            }
            if let Some(arguments) = function.arguments.filter(|args| !args.is_empty()) {
                inputs.push(DecoderInput::raw_arguments(key, arguments));
            }
        }

        if let Some(reason) = choice.finish_reason {
            for index in self.started.difference(&self.stopped) {
                inputs.push(DecoderInput::stop(SlotKey::Index(*index)));
            }
            self.stopped.extend(self.started.iter().copied());
            inputs.push(DecoderInput::MessageStop {
                reason: Some(reason),
            });
        }
    }
}

impl StreamAdapter for OpenAiAdapter {
    fn provider(&self) -> ProviderKind {
        PROVIDER
    }

    fn policy(&self) -> DecoderPolicy {
        DecoderPolicy::incremental_json()
    }

    fn translate(&mut self, event: Value) -> Result<Vec<DecoderInput>, TranslateError> {
        if event.as_str() == Some("[DONE]") {
            return Ok(Vec::new());
        }
        let chunk: ChatChunk = parse_envelope(PROVIDER, event)?;
        if let Some(error) = chunk.error {
            return Err(TranslateError::Provider(error.into()));
        }

        let mut inputs = Vec::new();
        for choice in chunk.choices {
            if choice.index != 0 {
                debug!(index = choice.index, "ignoring additional choice");
                continue;
            }
            self.translate_choice(choice, &mut inputs);
        }
        if let Some(usage) = chunk.usage {
            inputs.push(DecoderInput::Usage(extract(&usage)));
        }
        Ok(inputs)
    }

    fn synthesize_events(&self, response: &Value) -> Result<Vec<Value>, DecodeSkew> {
        let completion: CompletionResponse = serde_json::from_value(response.clone())
            .map_err(|err| DecodeSkew::from_serde(PROVIDER, err))?;
        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(DecodeSkew::new(PROVIDER, "completion has no choices"));
        };

        let chunk = |delta: Value, finish_reason: Option<&str>| {
            json!({
                "id": completion.id,
                "object": "chat.completion.chunk",
                "model": completion.model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
            })
        };

        let mut events = vec![chunk(json!({"role": "assistant"}), None)];
        if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
            events.push(chunk(json!({"content": content}), None));
        }
        for (index, call) in choice.message.tool_calls.iter().enumerate() {
            events.push(chunk(
                json!({"tool_calls": [{
                    "index": index,
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.function.name, "arguments": call.function.arguments}
                }]}),
                None,
            ));
        }
        events.push(chunk(
            json!({}),
            Some(choice.finish_reason.as_deref().unwrap_or("stop")),
        ));
        if let Some(usage) = completion.usage {
            events.push(json!({
                "id": completion.id,
                "object": "chat.completion.chunk",
                "model": completion.model,
                "choices": [],
                "usage": usage
            }));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> Value {
        json!({
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{
                    "index": index,
                    "id": id,
                    "function": {"name": name, "arguments": args}
                }]}
            }]
        })
    }

    #[test]
    fn test_first_sight_of_index_starts_call() {
        let mut adapter = OpenAiAdapter::new();
        let inputs = adapter
            .translate(tool_chunk(0, Some("call_1"), Some("search"), ""))
            .unwrap();
        assert_eq!(
            inputs,
            vec![DecoderInput::tool_start(
                SlotKey::Index(0),
                Some("call_1".into()),
                Some("search".into())
            )]
        );

        let inputs = adapter.translate(tool_chunk(0, None, None, "{\"q\"")).unwrap();
        assert_eq!(
            inputs,
            vec![DecoderInput::raw_arguments(SlotKey::Index(0), "{\"q\"")]
        );
    }

    #[test]
    fn test_finish_reason_stops_every_started_call_once() {
        let mut adapter = OpenAiAdapter::new();
        adapter.translate(tool_chunk(0, Some("a"), Some("f"), "{}")).unwrap();
        adapter.translate(tool_chunk(1, Some("b"), Some("g"), "{}")).unwrap();

        let finish = json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]});
        let inputs = adapter.translate(finish.clone()).unwrap();
        assert_eq!(
            inputs,
            vec![
                DecoderInput::stop(SlotKey::Index(0)),
                DecoderInput::stop(SlotKey::Index(1)),
                DecoderInput::MessageStop {
                    reason: Some("tool_calls".into())
                },
            ]
        );
        assert_eq!(adapter.translate(finish).unwrap().len(), 1);
    }

    #[test]
    fn test_usage_only_chunk() {
        let mut adapter = OpenAiAdapter::new();
        let inputs = adapter
            .translate(json!({
                "choices": [],
                "usage": {"prompt_tokens": 1000, "completion_tokens": 5, "total_tokens": 1005,
                          "prompt_tokens_details": {"cached_tokens": 400}}
            }))
            .unwrap();
        match &inputs[0] {
            DecoderInput::Usage(usage) => assert_eq!(usage.cache_discount, Some(0.4)),
            other => panic!("expected usage, got {:?}", other),
        }
    }

    #[test]
    fn test_error_chunk_ends_attempt() {
        let mut adapter = OpenAiAdapter::new();
        let err = adapter
            .translate(json!({"error": {"message": "slow down", "code": "rate_limit_exceeded"}}))
            .unwrap_err();
        assert!(matches!(
            err,
            TranslateError::Provider(TransportError::RateLimit { .. })
        ));
    }

    #[test]
    fn test_non_object_chunk_is_skew() {
        let mut adapter = OpenAiAdapter::new();
        assert!(adapter.translate(json!("[DONE]")).unwrap().is_empty());
        assert!(matches!(
            adapter.translate(json!(42)),
            Err(TranslateError::Skew(_))
        ));
    }
}
