//! Anthropic Messages API stream adapter
//!
//! Block lifecycle events map one-to-one onto decoder inputs. Usage arrives
//! in two halves: the prompt side on `message_start`, output on
//! `message_delta`.

use super::adapter::{null_as_default, parse_envelope, StreamAdapter, TranslateError};
use crate::decode::{
    BlockKind, DecodeSkew, DecoderInput, DecoderPolicy, SlotKey, TransportError,
};
use crate::protocol::ProviderKind;
use crate::usage::{extract, AnthropicUsage};
use serde::Deserialize;
use serde_json::{json, Value};

const PROVIDER: ProviderKind = ProviderKind::Anthropic;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: MessageStartBody,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorBody,
    },
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    /// thinking, redacted_thinking and server-side blocks
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    /// thinking_delta, signature_delta, citations
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

impl From<ErrorBody> for TransportError {
    fn from(body: ErrorBody) -> Self {
        match body.kind.as_str() {
            "overloaded_error" | "api_error" => TransportError::ServiceUnavailable(body.message),
            "rate_limit_error" => TransportError::RateLimit {
                message: body.message,
                retry_after: None,
            },
            "authentication_error" | "permission_error" => {
                TransportError::Authentication(body.message)
            }
            _ => TransportError::Provider {
                code: body.kind,
                message: body.message,
            },
        }
    }
}

/// Non-streaming Messages API response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

/// Messages API stream adapter
#[derive(Debug, Default)]
pub struct AnthropicAdapter {
    usage: AnthropicUsage,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn usage_input(&mut self, usage: Option<AnthropicUsage>) -> Option<DecoderInput> {
        let usage = usage?;
        self.usage.merge(&usage);
        Some(DecoderInput::Usage(extract(&self.usage)))
    }
}

impl StreamAdapter for AnthropicAdapter {
    fn provider(&self) -> ProviderKind {
        PROVIDER
    }

    fn policy(&self) -> DecoderPolicy {
        DecoderPolicy::incremental_json()
    }

    fn translate(&mut self, event: Value) -> Result<Vec<DecoderInput>, TranslateError> {
        let inputs = match parse_envelope(PROVIDER, event)? {
            AnthropicEvent::MessageStart { message } => {
                self.usage_input(message.usage).into_iter().collect()
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let key = SlotKey::Index(index);
                match content_block {
                    ContentBlock::Text { text } => {
                        let mut inputs = vec![DecoderInput::BlockStart {
                            key: key.clone(),
                            kind: BlockKind::Text,
                        }];
                        if !text.is_empty() {
                            inputs.push(DecoderInput::text(key, text));
                        }
                        inputs
                    }
                    ContentBlock::ToolUse { id, name } => {
                        vec![DecoderInput::tool_start(key, Some(id), Some(name))]
                    }
                    ContentBlock::Other => Vec::new(),
                }
            }
            AnthropicEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => {
                    vec![DecoderInput::text(SlotKey::Index(index), text)]
                }
                ContentDelta::InputJsonDelta { partial_json } => {
                    vec![DecoderInput::raw_arguments(SlotKey::Index(index), partial_json)]
                }
                ContentDelta::Other => Vec::new(),
            },
            AnthropicEvent::ContentBlockStop { index } => {
                vec![DecoderInput::stop(SlotKey::Index(index))]
            }
            AnthropicEvent::MessageDelta { delta, usage } => {
                let mut inputs = vec![DecoderInput::MessageStop {
                    reason: delta.stop_reason,
                }];
                inputs.extend(self.usage_input(usage));
                inputs
            }
            AnthropicEvent::MessageStop | AnthropicEvent::Ping => Vec::new(),
            AnthropicEvent::Error { error } => {
                return Err(TranslateError::Provider(error.into()));
            }
        };
        Ok(inputs)
    }

    fn synthesize_events(&self, response: &Value) -> Result<Vec<Value>, DecodeSkew> {
        let message: MessageResponse = serde_json::from_value(response.clone())
            .map_err(|err| DecodeSkew::from_serde(PROVIDER, err))?;

        let mut events = vec![json!({
            "type": "message_start",
            "message": {
                "id": message.id,
                "model": message.model,
                "usage": message.usage,
            }
        })];

        for (index, block) in message.content.iter().enumerate() {
            let kind = block.get("type").and_then(Value::as_str).unwrap_or_default();
            match kind {
                "text" => {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                    events.push(json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": {"type": "text", "text": ""}
                    }));
                    events.push(json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": {"type": "text_delta", "text": text}
                    }));
                }
                "tool_use" => {
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    events.push(json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": {
                            "type": "tool_use",
                            "id": block.get("id"),
                            "name": block.get("name"),
                            "input": {}
                        }
                    }));
                    events.push(json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": {"type": "input_json_delta", "partial_json": input.to_string()}
                    }));
                }
                _ => continue,
            }
            events.push(json!({"type": "content_block_stop", "index": index}));
        }

        events.push(json!({
            "type": "message_delta",
            "delta": {"stop_reason": message.stop_reason},
        }));
        events.push(json!({"type": "message_stop"}));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{BlockDelta, Fragment};

    #[test]
    fn test_thinking_blocks_are_ignored() {
        let mut adapter = AnthropicAdapter::new();
        let start = json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "thinking", "thinking": ""}
        });
        let delta = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "thinking_delta", "thinking": "hmm"}
        });
        assert!(adapter.translate(start).unwrap().is_empty());
        assert!(adapter.translate(delta).unwrap().is_empty());
    }

    #[test]
    fn test_input_json_delta_is_raw_fragment() {
        let mut adapter = AnthropicAdapter::new();
        let inputs = adapter
            .translate(json!({
                "type": "content_block_delta",
                "index": 2,
                "delta": {"type": "input_json_delta", "partial_json": "{\"a\""}
            }))
            .unwrap();
        assert_eq!(
            inputs,
            vec![DecoderInput::BlockDelta {
                key: SlotKey::Index(2),
                delta: BlockDelta::Arguments(Fragment::Raw("{\"a\"".into())),
            }]
        );
    }

    #[test]
    fn test_usage_halves_are_merged() {
        let mut adapter = AnthropicAdapter::new();
        adapter
            .translate(json!({
                "type": "message_start",
                "message": {"id": "msg_1", "usage": {"input_tokens": 600, "cache_read_input_tokens": 400, "output_tokens": 1}}
            }))
            .unwrap();
        let inputs = adapter
            .translate(json!({
                "type": "message_delta",
                "delta": {"stop_reason": "tool_use"},
                "usage": {"output_tokens": 42}
            }))
            .unwrap();

        match &inputs[1] {
            DecoderInput::Usage(usage) => {
                assert_eq!(usage.input_tokens, 1000);
                assert_eq!(usage.output_tokens, 42);
                assert_eq!(usage.cache_discount, Some(0.4));
            }
            other => panic!("expected usage, got {:?}", other),
        }
    }

    #[test]
    fn test_overloaded_error_is_transport_failure() {
        let mut adapter = AnthropicAdapter::new();
        let err = adapter
            .translate(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            }))
            .unwrap_err();
        assert_eq!(
            err,
            TranslateError::Provider(TransportError::ServiceUnavailable("Overloaded".into()))
        );
    }

    #[test]
    fn test_unknown_event_is_skew() {
        let mut adapter = AnthropicAdapter::new();
        let err = adapter.translate(json!({"type": "mystery"})).unwrap_err();
        assert!(matches!(err, TranslateError::Skew(_)));
    }

    #[test]
    fn test_synthesized_events_translate_cleanly() {
        let response = json!({
            "id": "msg_1",
            "model": "claude",
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": "x"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 5, "output_tokens": 7}
        });
        let mut adapter = AnthropicAdapter::new();
        let events = adapter.synthesize_events(&response).unwrap();
        assert_eq!(events.len(), 9);
        for event in events {
            adapter.translate(event).unwrap();
        }
    }
}
