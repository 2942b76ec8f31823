//! OpenAI Responses API stream adapter
//!
//! Output items are addressed by item id. The `done` events repeat the full
//! arguments, which take precedence over the accumulated deltas.

use super::adapter::{parse_envelope, StreamAdapter, TranslateError};
use crate::decode::{
    BlockKind, DecodeSkew, DecoderInput, DecoderPolicy, SlotKey, StopArguments,
    ToolCompletion, TransportError,
};
use crate::protocol::ProviderKind;
use crate::usage::{extract, ResponsesUsage};
use serde::Deserialize;
use serde_json::{json, Value};

const PROVIDER: ProviderKind = ProviderKind::OpenAiResponses;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesEvent {
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { item_id: String, delta: String },
    #[serde(rename = "response.function_call_arguments.delta")]
    ArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    ArgumentsDone { item_id: String, arguments: String },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseBody },
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponseBody },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseBody },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: String,
    },
    /// created, in_progress, content_part, reasoning summaries
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        id: String,
    },
    FunctionCall {
        id: String,
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    error: Option<ResponseErrorBody>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

fn provider_error(code: Option<String>, message: String) -> TransportError {
    match code.as_deref() {
        Some("rate_limit_exceeded") => TransportError::RateLimit {
            message,
            retry_after: None,
        },
        Some("server_error") => TransportError::ServiceUnavailable(message),
        _ => TransportError::Provider {
            code: code.unwrap_or_else(|| "response_failed".to_string()),
            message,
        },
    }
}

/// Responses API stream adapter
#[derive(Debug, Default)]
pub struct ResponsesAdapter;

impl ResponsesAdapter {
    pub fn new() -> Self {
        Self
    }

    fn finish(response: ResponseBody) -> Vec<DecoderInput> {
        let mut inputs = Vec::new();
        if let Some(usage) = response.usage {
            inputs.push(DecoderInput::Usage(extract(&usage)));
        }
        let reason = response
            .incomplete_details
            .and_then(|details| details.reason)
            .or(response.status);
        inputs.push(DecoderInput::MessageStop { reason });
        inputs
    }
}

impl StreamAdapter for ResponsesAdapter {
    fn provider(&self) -> ProviderKind {
        PROVIDER
    }

    fn policy(&self) -> DecoderPolicy {
        DecoderPolicy {
            stop_arguments: StopArguments::Authoritative,
            ..DecoderPolicy::incremental_json()
        }
    }

    fn translate(&mut self, event: Value) -> Result<Vec<DecoderInput>, TranslateError> {
        let inputs = match parse_envelope(PROVIDER, event)? {
            ResponsesEvent::OutputItemAdded { item } => match item {
                OutputItem::Message { id } => vec![DecoderInput::BlockStart {
                    key: SlotKey::Id(id),
                    kind: BlockKind::Text,
                }],
                OutputItem::FunctionCall {
                    id, call_id, name, ..
                } => vec![DecoderInput::tool_start(SlotKey::Id(id), call_id, name)],
                OutputItem::Other => Vec::new(),
            },
            ResponsesEvent::OutputItemDone { item } => match item {
                OutputItem::Message { id } => vec![DecoderInput::stop(SlotKey::Id(id))],
                OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                } => vec![DecoderInput::BlockStop {
                    key: SlotKey::Id(id),
                    completion: Some(ToolCompletion {
                        id: call_id,
                        name,
                        arguments,
                        provenance_token: None,
                    }),
                }],
                OutputItem::Other => Vec::new(),
            },
            ResponsesEvent::OutputTextDelta { item_id, delta } => {
                vec![DecoderInput::text(SlotKey::Id(item_id), delta)]
            }
            ResponsesEvent::ArgumentsDelta { item_id, delta } => {
                vec![DecoderInput::raw_arguments(SlotKey::Id(item_id), delta)]
            }
            ResponsesEvent::ArgumentsDone { item_id, arguments } => {
                vec![DecoderInput::BlockStop {
                    key: SlotKey::Id(item_id),
                    completion: Some(ToolCompletion {
                        arguments: Some(arguments),
                        ..Default::default()
                    }),
                }]
            }
            ResponsesEvent::Completed { response } | ResponsesEvent::Incomplete { response } => {
                Self::finish(response)
            }
            ResponsesEvent::Failed { response } => {
                let (code, message) = match response.error {
                    Some(error) => (error.code, error.message),
                    None => (None, "response failed".to_string()),
                };
                return Err(TranslateError::Provider(provider_error(code, message)));
            }
            ResponsesEvent::Error { code, message } => {
                return Err(TranslateError::Provider(provider_error(code, message)));
            }
            ResponsesEvent::Other => Vec::new(),
        };
        Ok(inputs)
    }

    fn synthesize_events(&self, response: &Value) -> Result<Vec<Value>, DecodeSkew> {
        let output = response
            .get("output")
            .and_then(Value::as_array)
            .ok_or_else(|| DecodeSkew::new(PROVIDER, "response has no output array"))?;

        let mut events = Vec::new();
        for (output_index, item) in output.iter().enumerate() {
            let id = item.get("id").cloned().unwrap_or(Value::Null);
            match item.get("type").and_then(Value::as_str) {
                Some("message") => {
                    events.push(json!({
                        "type": "response.output_item.added",
                        "output_index": output_index,
                        "item": {"type": "message", "id": id, "role": "assistant", "content": []}
                    }));
                    let parts = item.get("content").and_then(Value::as_array);
                    for part in parts.into_iter().flatten() {
                        if part.get("type").and_then(Value::as_str) != Some("output_text") {
                            continue;
                        }
                        events.push(json!({
                            "type": "response.output_text.delta",
                            "item_id": id,
                            "output_index": output_index,
                            "delta": part.get("text").cloned().unwrap_or_else(|| json!(""))
                        }));
                    }
                }
                Some("function_call") => {
                    let arguments = item
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    events.push(json!({
                        "type": "response.output_item.added",
                        "output_index": output_index,
                        "item": {
                            "type": "function_call",
                            "id": id,
                            "call_id": item.get("call_id"),
                            "name": item.get("name"),
                            "arguments": ""
                        }
                    }));
                    events.push(json!({
                        "type": "response.function_call_arguments.delta",
                        "item_id": id,
                        "output_index": output_index,
                        "delta": arguments
                    }));
                    events.push(json!({
                        "type": "response.function_call_arguments.done",
                        "item_id": id,
                        "output_index": output_index,
                        "arguments": arguments
                    }));
                }
                _ => continue,
            }
            events.push(json!({
                "type": "response.output_item.done",
                "output_index": output_index,
                "item": item
            }));
        }
        events.push(json!({"type": "response.completed", "response": response}));
        Ok(events)
    }
}
