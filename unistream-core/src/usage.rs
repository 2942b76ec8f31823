//! Usage and cache token extraction
//!
//! Each provider reports usage in its own envelope. Every envelope implements
//! [`UsageSource`], which encodes where that provider keeps its cached and
//! reasoning counts, and [`extract`] turns any of them into a [`UsageRecord`].

use crate::protocol::UsageRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A provider usage envelope
pub trait UsageSource {
    /// Full prompt size, including tokens served from cache
    fn input_tokens(&self) -> u64;

    fn output_tokens(&self) -> u64;

    /// Total as reported by the provider
    fn reported_total(&self) -> Option<u64> {
        None
    }

    fn cached_tokens(&self) -> Option<u64> {
        None
    }

    fn reasoning_tokens(&self) -> Option<u64> {
        None
    }
}

/// Normalize a provider usage envelope. Total for every input.
pub fn extract<U: UsageSource + ?Sized>(source: &U) -> UsageRecord {
    let input = source.input_tokens();
    let output = source.output_tokens();
    let total = source
        .reported_total()
        .unwrap_or_else(|| input.saturating_add(output));
    UsageRecord::new(
        input,
        output,
        total,
        source.cached_tokens().unwrap_or(0),
        source.reasoning_tokens(),
    )
}

/// Anthropic `usage`, split across `message_start` and `message_delta`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
}

impl AnthropicUsage {
    /// Overlay a later report; fields it carries win
    pub fn merge(&mut self, later: &AnthropicUsage) {
        self.input_tokens = later.input_tokens.or(self.input_tokens);
        self.output_tokens = later.output_tokens.or(self.output_tokens);
        self.cache_creation_input_tokens = later
            .cache_creation_input_tokens
            .or(self.cache_creation_input_tokens);
        self.cache_read_input_tokens = later
            .cache_read_input_tokens
            .or(self.cache_read_input_tokens);
    }
}

impl UsageSource for AnthropicUsage {
    // Wire input_tokens excludes cache reads and writes
    fn input_tokens(&self) -> u64 {
        self.input_tokens
            .unwrap_or(0)
            .saturating_add(self.cache_read_input_tokens.unwrap_or(0))
            .saturating_add(self.cache_creation_input_tokens.unwrap_or(0))
    }

    fn output_tokens(&self) -> u64 {
        self.output_tokens.unwrap_or(0)
    }

    fn cached_tokens(&self) -> Option<u64> {
        self.cache_read_input_tokens
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u64>,
}

/// Chat Completions `usage`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
    /// Fields compatible servers add beside the standard ones
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UsageSource for OpenAiUsage {
    fn input_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    fn output_tokens(&self) -> u64 {
        self.completion_tokens
    }

    fn reported_total(&self) -> Option<u64> {
        self.total_tokens
    }

    fn cached_tokens(&self) -> Option<u64> {
        self.prompt_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens)
    }

    fn reasoning_tokens(&self) -> Option<u64> {
        self.completion_tokens_details
            .as_ref()
            .and_then(|details| details.reasoning_tokens)
            .or_else(|| self.extra.get("reasoning_tokens").and_then(Value::as_u64))
    }
}

/// Responses API `usage`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsesUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub input_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    pub output_tokens_details: Option<CompletionTokensDetails>,
}

impl UsageSource for ResponsesUsage {
    fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    fn reported_total(&self) -> Option<u64> {
        self.total_tokens
    }

    fn cached_tokens(&self) -> Option<u64> {
        self.input_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens)
    }

    fn reasoning_tokens(&self) -> Option<u64> {
        self.output_tokens_details
            .as_ref()
            .and_then(|details| details.reasoning_tokens)
    }
}

/// Gemini `usageMetadata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsage {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: Option<u64>,
    #[serde(default)]
    pub cached_content_token_count: Option<u64>,
    #[serde(default)]
    pub thoughts_token_count: Option<u64>,
}

impl UsageSource for GeminiUsage {
    fn input_tokens(&self) -> u64 {
        self.prompt_token_count
    }

    fn output_tokens(&self) -> u64 {
        self.candidates_token_count
    }

    fn reported_total(&self) -> Option<u64> {
        self.total_token_count
    }

    fn cached_tokens(&self) -> Option<u64> {
        self.cached_content_token_count
    }

    fn reasoning_tokens(&self) -> Option<u64> {
        self.thoughts_token_count
    }
}

/// Bedrock Converse `metadata.usage`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_write_input_tokens: Option<u64>,
}

impl UsageSource for BedrockUsage {
    // Same accounting as Anthropic: wire inputTokens excludes cache traffic
    fn input_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens.unwrap_or(0))
            .saturating_add(self.cache_write_input_tokens.unwrap_or(0))
    }

    fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    fn reported_total(&self) -> Option<u64> {
        self.total_tokens
    }

    fn cached_tokens(&self) -> Option<u64> {
        self.cache_read_input_tokens
    }
}
