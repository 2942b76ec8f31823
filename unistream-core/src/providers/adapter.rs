//! Provider stream adapter trait
//!
//! An adapter owns the knowledge of one upstream wire shape. It parses each
//! native event once into a typed envelope and translates it into
//! [`DecoderInput`]s; it never touches the state machine directly.

use crate::decode::{DecodeSkew, DecoderInput, DecoderPolicy, TransportError};
use crate::protocol::ProviderKind;
use serde_json::Value;
use thiserror::Error;

/// Core trait every upstream stream shape implements
///
/// Adapters may keep per-response state, so one adapter decodes one response.
pub trait StreamAdapter: Send {
    /// Upstream shape this adapter understands
    fn provider(&self) -> ProviderKind;

    /// Decoding behavior the provider declares
    fn policy(&self) -> DecoderPolicy;

    /// Translate one native event
    fn translate(&mut self, event: Value) -> Result<Vec<DecoderInput>, TranslateError>;

    /// Expand one persisted non-streaming response into the native stream
    /// events that would have produced it
    fn synthesize_events(&self, response: &Value) -> Result<Vec<Value>, DecodeSkew>;
}

/// Why an event could not be translated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    /// Malformed or unexpected; skip it
    #[error(transparent)]
    Skew(#[from] DecodeSkew),

    /// The provider reported a failure in-band; end the attempt
    #[error(transparent)]
    Provider(#[from] TransportError),
}

impl ProviderKind {
    /// Create a fresh adapter for one response
    pub fn adapter(&self) -> Box<dyn StreamAdapter> {
        match self {
            ProviderKind::Anthropic => Box::new(super::AnthropicAdapter::new()),
            ProviderKind::OpenAi => Box::new(super::OpenAiAdapter::new()),
            ProviderKind::OpenAiResponses => Box::new(super::ResponsesAdapter::new()),
            ProviderKind::Gemini => Box::new(super::GeminiAdapter::new()),
            ProviderKind::Bedrock => Box::new(super::BedrockAdapter::new()),
        }
    }

    /// Decoding policy the provider declares
    pub fn policy(&self) -> DecoderPolicy {
        self.adapter().policy()
    }
}

/// Parse an event into its typed envelope, mapping failures to a skew
pub(crate) fn parse_envelope<T: serde::de::DeserializeOwned>(
    provider: ProviderKind,
    event: Value,
) -> Result<T, DecodeSkew> {
    serde_json::from_value(event).map_err(|err| DecodeSkew::from_serde(provider, err))
}

/// Read an explicit `null` the same as a missing field
///
/// OpenAI-compatible servers send `"tool_calls": null` alongside real content.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    let value = <Option<T> as serde::Deserialize>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
