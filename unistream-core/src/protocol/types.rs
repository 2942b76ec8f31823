//! Core protocol types for the unified conversation model
//!
//! Every stream decoder produces these types and every caller consumes them.
//! The design prioritizes:
//! - One representation regardless of which upstream produced the response
//! - Tagged unions so invalid combinations are hard to express
//! - Stable serialization, since captures and request hashes depend on it

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upstream wire shape a response was streamed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Messages API block lifecycle (`content_block_start/delta/stop`)
    Anthropic,
    /// Chat Completions chunks with index-keyed tool call deltas
    #[serde(rename = "openai")]
    OpenAi,
    /// Responses API item events keyed by item id
    #[serde(rename = "openai_responses")]
    OpenAiResponses,
    /// `streamGenerateContent` chunks with whole function call parts
    Gemini,
    /// Converse stream with externally tagged block events
    Bedrock,
}

impl ProviderKind {
    /// All supported provider kinds
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Anthropic,
        ProviderKind::OpenAi,
        ProviderKind::OpenAiResponses,
        ProviderKind::Gemini,
        ProviderKind::Bedrock,
    ];

    /// Stable identifier used in captures and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenAiResponses => "openai_responses",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Bedrock => "bedrock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions that guide the model's behavior
    System,
    /// User input message
    User,
    /// Assistant (model) response
    Assistant,
    /// Results of tool calls requested by the assistant
    ToolResult,
}

impl Role {
    /// Lowercase name used in canonical request serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolResult => "tool_result",
        }
    }
}

/// Where image bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Base64,
    Url,
}

/// A complete tool call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-issued (or deterministically generated) call id
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a canonical JSON document
    pub arguments: String,

    /// Opaque continuation token that must be echoed back verbatim next turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_token: Option<String>,
}

impl ToolCall {
    /// Create a tool call without a provenance token
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            provenance_token: None,
        }
    }

    /// Attach a provenance token
    pub fn with_provenance_token(mut self, token: impl Into<String>) -> Self {
        self.provenance_token = Some(token.into());
        self
    }

    /// Parse the arguments document
    pub fn arguments_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.arguments)
    }
}

/// Individual content part of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { value: String },
    /// Inline or referenced image
    Image {
        source_kind: ImageSource,
        media_type: String,
        data: String,
    },
    /// Tool invocation requested by the assistant
    ToolCall(ToolCall),
    /// Result of running a tool
    ToolCallResponse {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl ContentPart {
    /// Create a text part
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text {
            value: value.into(),
        }
    }

    /// Text carried by this part, if it is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { value } => Some(value.as_str()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ContentPart::Text { .. } => "text",
            ContentPart::Image { .. } => "image",
            ContentPart::ToolCall(_) => "tool_call",
            ContentPart::ToolCallResponse { .. } => "tool_call_response",
        }
    }
}

/// Violations of the message shape invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageShapeError {
    #[error("{role:?} message may not contain a {part} part")]
    PartNotAllowed { role: Role, part: &'static str },
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Ordered content parts
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        MessageBuilder::new(Role::System).text(content).build()
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        MessageBuilder::new(Role::User).text(content).build()
    }

    /// Create an assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        MessageBuilder::new(Role::Assistant).text(content).build()
    }

    /// Create a tool result message carrying one response
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        MessageBuilder::new(Role::ToolResult)
            .tool_response(tool_call_id, name, content)
            .build()
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(ContentPart::as_text).collect()
    }

    /// Tool calls carried by this message
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.parts.iter().filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// Check role-specific part constraints
    pub fn validate(&self) -> Result<(), MessageShapeError> {
        for part in &self.parts {
            let allowed = match self.role {
                Role::ToolResult => matches!(part, ContentPart::ToolCallResponse { .. }),
                Role::Assistant => {
                    matches!(part, ContentPart::Text { .. } | ContentPart::ToolCall(_))
                }
                Role::System | Role::User => !matches!(part, ContentPart::ToolCall(_)),
            };
            if !allowed {
                return Err(MessageShapeError::PartNotAllowed {
                    role: self.role,
                    part: part.kind(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for constructing messages part by part
pub struct MessageBuilder {
    role: Role,
    parts: Vec<ContentPart>,
}

impl MessageBuilder {
    /// Start a message with the given role
    pub fn new(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    /// Append a text part
    pub fn text(mut self, value: impl Into<String>) -> Self {
        self.parts.push(ContentPart::text(value));
        self
    }

    /// Append an image part
    pub fn image(
        mut self,
        source_kind: ImageSource,
        media_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        self.parts.push(ContentPart::Image {
            source_kind,
            media_type: media_type.into(),
            data: data.into(),
        });
        self
    }

    /// Append a tool call part
    pub fn tool_call(mut self, call: ToolCall) -> Self {
        self.parts.push(ContentPart::ToolCall(call));
        self
    }

    /// Append a tool response part
    pub fn tool_response(
        mut self,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.parts.push(ContentPart::ToolCallResponse {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        });
        self
    }

    /// Build the message
    pub fn build(self) -> Message {
        Message {
            role: self.role,
            parts: self.parts,
        }
    }
}

/// Tool declaration sent with a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parameters schema (JSON Schema)
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Chat request as seen by the dispatcher and the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Model identifier to use
    #[serde(default)]
    pub model: String,

    /// Messages in the conversation
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the model for a JSON object response
    #[serde(default)]
    pub json_mode: bool,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    /// Create a new chat request with model and messages
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Enable JSON mode
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Declare a tool
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Same request addressed to another model
    pub fn for_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Streaming output
// ============================================================================

/// Event emitted to a consumer while a response is decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A piece of assistant text, in source order
    ContentDelta { text: String },
    /// A tool call whose arguments are fully assembled
    ToolCallComplete(ToolCall),
    /// The provider stream is exhausted
    End,
}

/// Token usage normalized across providers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Prompt tokens, including any served from cache
    pub input_tokens: u64,

    /// Generated tokens
    pub output_tokens: u64,

    /// Total tokens as billed
    pub total_tokens: u64,

    /// Prompt tokens served from a provider-side cache
    #[serde(default)]
    pub cached_tokens: u64,

    /// `cached_tokens / input_tokens`, presentation only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_discount: Option<f64>,

    /// Reasoning / thinking tokens when the provider reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl UsageRecord {
    /// Build a record, deriving the cache discount.
    ///
    /// The discount is present iff both `cached_tokens` and `input_tokens`
    /// are non-zero.
    pub fn new(
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
        cached_tokens: u64,
        reasoning_tokens: Option<u64>,
    ) -> Self {
        let cache_discount = if cached_tokens > 0 && input_tokens > 0 {
            Some(cached_tokens as f64 / input_tokens as f64)
        } else {
            None
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
            cached_tokens,
            cache_discount,
            reasoning_tokens,
        }
    }
}

/// Counters for non-fatal problems absorbed while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodeDiagnostics {
    /// Events that were malformed or of an unexpected shape
    pub skipped_events: usize,

    /// Tool calls whose arguments were replaced with `{}`
    pub repaired_arguments: usize,
}

/// Fully accumulated response of one decode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    /// Provider whose stream was decoded
    pub provider: ProviderKind,

    /// Model the request was sent to
    pub model: String,

    /// Concatenated assistant text
    pub text: String,

    /// Completed tool calls in emission order
    pub tool_calls: Vec<ToolCall>,

    /// Last usage reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageRecord>,

    /// Raw stop reason as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Absorbed decode problems
    #[serde(default)]
    pub diagnostics: DecodeDiagnostics,
}

impl UnifiedResponse {
    /// Create an empty response for a provider and model
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            text: String::new(),
            tool_calls: Vec::new(),
            usage: None,
            stop_reason: None,
            diagnostics: DecodeDiagnostics::default(),
        }
    }

    /// No text and no tool calls
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty()
    }

    /// Assistant message for the conversation history, text first
    pub fn to_message(&self) -> Message {
        let mut builder = MessageBuilder::new(Role::Assistant);
        if !self.text.is_empty() {
            builder = builder.text(self.text.clone());
        }
        for call in &self.tool_calls {
            builder = builder.tool_call(call.clone());
        }
        builder.build()
    }
}
