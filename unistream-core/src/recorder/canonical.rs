//! Canonical request form and its hash
//!
//! Two logically identical requests must serialize to the same bytes. Field
//! order is fixed by the struct definitions and part objects go through
//! `serde_json::Value`, whose maps are key-sorted.

use super::error::RecorderResult;
use crate::protocol::{ChatRequest, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: String,
    pub content: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub tool_count: usize,
}

/// Request as persisted in a capture and hashed for lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRequest {
    pub messages: Vec<CanonicalMessage>,
    pub model_id: String,
    pub options: CanonicalOptions,
}

impl CanonicalRequest {
    pub fn from_request(request: &ChatRequest) -> RecorderResult<Self> {
        let messages = request
            .messages
            .iter()
            .map(canonical_message)
            .collect::<RecorderResult<Vec<_>>>()?;
        Ok(Self {
            messages,
            model_id: request.model.clone(),
            options: CanonicalOptions {
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                json_mode: request.json_mode,
                tool_count: request.tools.len(),
            },
        })
    }

    /// SHA-256 of the serialized form, lowercase hex
    pub fn hash(&self) -> RecorderResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

fn canonical_message(message: &Message) -> RecorderResult<CanonicalMessage> {
    let content = message
        .parts
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CanonicalMessage {
        role: message.role.as_str().to_string(),
        content,
    })
}

/// Hash of a request's canonical form
pub fn request_hash(request: &ChatRequest) -> RecorderResult<String> {
    CanonicalRequest::from_request(request)?.hash()
}
