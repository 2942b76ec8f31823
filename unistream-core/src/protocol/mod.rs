//! Protocol module for the unified conversation model
//!
//! This module defines the canonical message, content and streaming types.
//! These structures are:
//! - Provider-agnostic
//! - Shared by live decoding and replay
//! - Serializable with a stable field order

pub mod types;

pub use types::{
    ChatRequest, ContentPart, DecodeDiagnostics, ImageSource, Message, MessageBuilder,
    MessageShapeError, ProviderKind, Role, StreamEvent, ToolCall, ToolDefinition,
    UnifiedResponse, UsageRecord,
};
