//! Gemini `streamGenerateContent` adapter
//!
//! Function calls arrive whole, one part each, so every call is a merge of a
//! single object followed by an immediate stop. Ids are optional and the
//! thought signature is only attached to the first call of a turn.

use super::adapter::{null_as_default, parse_envelope, StreamAdapter, TranslateError};
use crate::decode::{
    BlockDelta, DecodeSkew, DecoderInput, DecoderPolicy, Fragment, FragmentMode, IdentityTiming,
    ProvenanceScope, SlotKey, StopArguments, ToolCompletion, TransportError,
};
use crate::protocol::ProviderKind;
use crate::usage::{extract, GeminiUsage};
use serde::Deserialize;
use serde_json::Value;

const PROVIDER: ProviderKind = ProviderKind::Gemini;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default, deserialize_with = "null_as_default")]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
    #[serde(default)]
    thought_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl From<GeminiErrorBody> for TransportError {
    fn from(body: GeminiErrorBody) -> Self {
        match (body.status.as_deref(), body.code) {
            (Some("RESOURCE_EXHAUSTED"), _) | (_, Some(429)) => TransportError::RateLimit {
                message: body.message,
                retry_after: None,
            },
            (Some("UNAVAILABLE"), _) | (_, Some(503)) => {
                TransportError::ServiceUnavailable(body.message)
            }
            (Some("UNAUTHENTICATED" | "PERMISSION_DENIED"), _) | (_, Some(401 | 403)) => {
                TransportError::Authentication(body.message)
            }
            _ => TransportError::Provider {
                code: body
                    .status
                    .clone()
                    .or_else(|| body.code.map(|code| code.to_string()))
                    .unwrap_or_else(|| "unknown".to_string()),
                message: body.message,
            },
        }
    }
}

/// Gemini stream adapter
#[derive(Debug, Default)]
pub struct GeminiAdapter {
    next_call: u32,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn text_key() -> SlotKey {
        SlotKey::Id("text".to_string())
    }
}

impl StreamAdapter for GeminiAdapter {
    fn provider(&self) -> ProviderKind {
        PROVIDER
    }

    fn policy(&self) -> DecoderPolicy {
        DecoderPolicy {
            identity: IdentityTiming::AtBlockStop,
            fragments: FragmentMode::StructuralMerge,
            stop_arguments: StopArguments::SignalOnly,
            provenance: ProvenanceScope::SharedAcrossTurn,
        }
    }

    fn translate(&mut self, event: Value) -> Result<Vec<DecoderInput>, TranslateError> {
        let chunk: GenerateChunk = parse_envelope(PROVIDER, event)?;
        if let Some(error) = chunk.error {
            return Err(TranslateError::Provider(error.into()));
        }

        let mut inputs = Vec::new();
        let candidate = chunk
            .candidates
            .into_iter()
            .find(|candidate| candidate.index.unwrap_or(0) == 0);
        if let Some(candidate) = candidate {
            let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
            for part in parts {
                if let Some(call) = part.function_call {
                    let key = SlotKey::Index(self.next_call);
                    self.next_call += 1;
                    if let Some(args) = call.args {
                        inputs.push(DecoderInput::BlockDelta {
                            key: key.clone(),
                            delta: BlockDelta::Arguments(Fragment::Object(args)),
                        });
                    }
                    inputs.push(DecoderInput::BlockStop {
                        key,
                        completion: Some(ToolCompletion {
                            id: call.id,
                            name: Some(call.name),
                            arguments: None,
                            provenance_token: part.thought_signature,
                        }),
                    });
                } else if let Some(text) = part.text {
                    if part.thought != Some(true) {
                        inputs.push(DecoderInput::text(Self::text_key(), text));
                    }
                }
            }
            if let Some(reason) = candidate.finish_reason {
                inputs.push(DecoderInput::MessageStop {
                    reason: Some(reason),
                });
            }
        }

        if let Some(usage) = chunk.usage_metadata {
            inputs.push(DecoderInput::Usage(extract(&usage)));
        }
        Ok(inputs)
    }

    // A non-streaming response has the same shape as a single chunk
    fn synthesize_events(&self, response: &Value) -> Result<Vec<Value>, DecodeSkew> {
        if !response.is_object() {
            return Err(DecodeSkew::new(PROVIDER, "response is not an object"));
        }
        Ok(vec![response.clone()])
    }
}
