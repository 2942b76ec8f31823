//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use unistream_core::protocol::{ChatRequest, Message, ProviderKind, StreamEvent};
use unistream_core::{EventSource, ProviderEventStream, TransportError};

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("unistream_core=debug")
        .with_test_writer()
        .try_init();
}

/// Scripted behavior for one model
#[derive(Debug, Clone)]
pub enum Script {
    /// Opening the stream fails
    OpenFails(TransportError),
    /// Stream yields these items in order
    Events(Vec<Result<Value, TransportError>>),
}

impl Script {
    pub fn ok(events: Vec<Value>) -> Self {
        Script::Events(events.into_iter().map(Ok).collect())
    }
}

/// Event source that replays canned events per model and records every open
pub struct ScriptedSource {
    provider: ProviderKind,
    scripts: HashMap<String, Script>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            scripts: HashMap::new(),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(mut self, model: &str, script: Script) -> Self {
        self.scripts.insert(model.to_string(), script);
        self
    }

    /// Models opened so far, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn opened_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.opened.clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    async fn open(&self, request: &ChatRequest) -> Result<ProviderEventStream, TransportError> {
        self.opened.lock().unwrap().push(request.model.clone());
        match self.scripts.get(&request.model) {
            Some(Script::OpenFails(err)) => Err(err.clone()),
            Some(Script::Events(events)) => Ok(stream::iter(events.clone()).boxed()),
            None => Err(TransportError::Provider {
                code: "model_not_found".to_string(),
                message: format!("no script for {}", request.model),
            }),
        }
    }
}

/// Drain a receiver until the channel closes
pub async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn weather_request(model: &str) -> ChatRequest {
    ChatRequest::new(
        model,
        vec![
            Message::system("You are a weather assistant."),
            Message::user("What's the weather in Paris?"),
        ],
    )
    .with_temperature(0.2)
}

/// Anthropic stream: one text block then a get_weather call split over three fragments
pub fn anthropic_weather_events() -> Vec<Value> {
    vec![
        json!({"type": "message_start", "message": {"id": "msg_01", "usage": {"input_tokens": 1000, "cache_read_input_tokens": 0, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me "}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "check."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_01", "name": "get_weather", "input": {}}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"ci"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "ty\": \"Par"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "is\"}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 42}}),
        json!({"type": "message_stop"}),
    ]
}

/// Anthropic stream carrying only the given text
pub fn anthropic_text_events(text: &str) -> Vec<Value> {
    vec![
        json!({"type": "message_start", "message": {"id": "msg_02", "usage": {"input_tokens": 10, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 3}}),
        json!({"type": "message_stop"}),
    ]
}

/// Anthropic stream that ends without any content
pub fn anthropic_empty_events() -> Vec<Value> {
    vec![
        json!({"type": "message_start", "message": {"id": "msg_03", "usage": {"input_tokens": 10, "output_tokens": 0}}}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 0}}),
        json!({"type": "message_stop"}),
    ]
}

pub fn overloaded() -> TransportError {
    TransportError::ServiceUnavailable("Overloaded".to_string())
}
