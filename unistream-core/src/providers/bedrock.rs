//! Bedrock Converse stream adapter
//!
//! Events are externally tagged (`{"contentBlockDelta": {...}}`) and blocks
//! are addressed by `contentBlockIndex`. Stream exceptions arrive in-band.

use super::adapter::{parse_envelope, StreamAdapter, TranslateError};
use crate::decode::{DecodeSkew, DecoderInput, DecoderPolicy, SlotKey, TransportError};
use crate::protocol::ProviderKind;
use crate::usage::{extract, BedrockUsage};
use serde::Deserialize;
use serde_json::{json, Value};

const PROVIDER: ProviderKind = ProviderKind::Bedrock;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ConverseEvent {
    MessageStart {
        #[serde(default)]
        role: Option<String>,
    },
    ContentBlockStart {
        content_block_index: u32,
        start: BlockStartBody,
    },
    ContentBlockDelta {
        content_block_index: u32,
        delta: BlockDeltaBody,
    },
    ContentBlockStop {
        content_block_index: u32,
    },
    MessageStop {
        #[serde(default)]
        stop_reason: Option<String>,
    },
    Metadata {
        #[serde(default)]
        usage: Option<BedrockUsage>,
    },
    InternalServerException {
        #[serde(default)]
        message: String,
    },
    ModelStreamErrorException {
        #[serde(default)]
        message: String,
    },
    ServiceUnavailableException {
        #[serde(default)]
        message: String,
    },
    ThrottlingException {
        #[serde(default)]
        message: String,
    },
    ValidationException {
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockStartBody {
    #[serde(default)]
    tool_use: Option<ToolUseStart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUseStart {
    tool_use_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockDeltaBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_use: Option<ToolUseDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolUseDelta {
    #[serde(default)]
    input: String,
}

/// Bedrock Converse stream adapter
#[derive(Debug, Default)]
pub struct BedrockAdapter;

impl BedrockAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl StreamAdapter for BedrockAdapter {
    fn provider(&self) -> ProviderKind {
        PROVIDER
    }

    fn policy(&self) -> DecoderPolicy {
        DecoderPolicy::incremental_json()
    }

    fn translate(&mut self, event: Value) -> Result<Vec<DecoderInput>, TranslateError> {
        let inputs = match parse_envelope(PROVIDER, event)? {
            ConverseEvent::MessageStart { .. } => Vec::new(),
            ConverseEvent::ContentBlockStart {
                content_block_index,
                start,
            } => match start.tool_use {
                Some(tool) => vec![DecoderInput::tool_start(
                    SlotKey::Index(content_block_index),
                    Some(tool.tool_use_id),
                    Some(tool.name),
                )],
                None => Vec::new(),
            },
            ConverseEvent::ContentBlockDelta {
                content_block_index,
                delta,
            } => {
                let key = SlotKey::Index(content_block_index);
                let mut inputs = Vec::new();
                if let Some(text) = delta.text {
                    inputs.push(DecoderInput::text(key.clone(), text));
                }
                if let Some(tool) = delta.tool_use {
                    inputs.push(DecoderInput::raw_arguments(key, tool.input));
                }
                inputs
            }
            ConverseEvent::ContentBlockStop {
                content_block_index,
            } => vec![DecoderInput::stop(SlotKey::Index(content_block_index))],
            ConverseEvent::MessageStop { stop_reason } => {
                vec![DecoderInput::MessageStop {
                    reason: stop_reason,
                }]
            }
            ConverseEvent::Metadata { usage } => usage
                .map(|usage| DecoderInput::Usage(extract(&usage)))
                .into_iter()
                .collect(),
            ConverseEvent::ThrottlingException { message } => {
                return Err(TranslateError::Provider(TransportError::RateLimit {
                    message,
                    retry_after: None,
                }));
            }
            ConverseEvent::InternalServerException { message }
            | ConverseEvent::ServiceUnavailableException { message } => {
                return Err(TranslateError::Provider(
                    TransportError::ServiceUnavailable(message),
                ));
            }
            ConverseEvent::ModelStreamErrorException { message } => {
                return Err(TranslateError::Provider(TransportError::Provider {
                    code: "modelStreamErrorException".to_string(),
                    message,
                }));
            }
            ConverseEvent::ValidationException { message } => {
                return Err(TranslateError::Provider(TransportError::Provider {
                    code: "validationException".to_string(),
                    message,
                }));
            }
        };
        Ok(inputs)
    }

    fn synthesize_events(&self, response: &Value) -> Result<Vec<Value>, DecodeSkew> {
        let content = response
            .pointer("/output/message/content")
            .and_then(Value::as_array)
            .ok_or_else(|| DecodeSkew::new(PROVIDER, "response has no output message"))?;

        let mut events = vec![json!({"messageStart": {"role": "assistant"}})];
        for (index, block) in content.iter().enumerate() {
            if let Some(text) = block.get("text") {
                events.push(json!({"contentBlockDelta": {
                    "contentBlockIndex": index,
                    "delta": {"text": text}
                }}));
            } else if let Some(tool) = block.get("toolUse") {
                let input = tool.get("input").cloned().unwrap_or_else(|| json!({}));
                events.push(json!({"contentBlockStart": {
                    "contentBlockIndex": index,
                    "start": {"toolUse": {"toolUseId": tool.get("toolUseId"), "name": tool.get("name")}}
                }}));
                events.push(json!({"contentBlockDelta": {
                    "contentBlockIndex": index,
                    "delta": {"toolUse": {"input": input.to_string()}}
                }}));
            } else {
                continue;
            }
            events.push(json!({"contentBlockStop": {"contentBlockIndex": index}}));
        }
        events.push(json!({"messageStop": {"stopReason": response.get("stopReason")}}));
        if let Some(usage) = response.get("usage") {
            events.push(json!({"metadata": {"usage": usage}}));
        }
        Ok(events)
    }
}
