//! Block lifecycle state machine shared by every provider

use crate::assembler::{Assembled, ToolCallAssembler};
use crate::decode::error::DecodeSkew;
use crate::decode::input::{
    BlockDelta, BlockKind, DecoderInput, DecoderPolicy, ProvenanceScope, SlotKey,
};
use crate::protocol::{ProviderKind, StreamEvent, ToolCall, UnifiedResponse};
use tracing::{debug, warn};

/// Which kind of block the decoder is inside
#[derive(Debug, Clone, PartialEq)]
pub enum BlockState {
    Idle,
    TextBlock(SlotKey),
    ToolUseBlock(SlotKey),
}

/// Drives one response from decoder inputs to stream events
///
/// Usage records are a side channel and are accepted in any state.
#[derive(Debug)]
pub struct StreamDecoder {
    provider: ProviderKind,
    policy: DecoderPolicy,
    assembler: ToolCallAssembler,
    state: BlockState,
    response: UnifiedResponse,
    shared_provenance: Option<String>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(provider: ProviderKind, policy: DecoderPolicy, model: impl Into<String>) -> Self {
        Self {
            provider,
            policy,
            assembler: ToolCallAssembler::new(provider, policy),
            state: BlockState::Idle,
            response: UnifiedResponse::new(provider, model),
            shared_provenance: None,
            finished: false,
        }
    }

    pub fn state(&self) -> &BlockState {
        &self.state
    }

    /// Response accumulated so far
    pub fn response(&self) -> &UnifiedResponse {
        &self.response
    }

    /// Apply one input, returning the events it produces in order
    pub fn apply(&mut self, input: DecoderInput) -> Vec<StreamEvent> {
        if self.finished {
            debug!(provider = %self.provider, "input after end of stream ignored");
            return Vec::new();
        }

        match input {
            DecoderInput::BlockStart {
                key,
                kind: BlockKind::Text,
            } => {
                self.transition(BlockState::TextBlock(key));
                Vec::new()
            }
            DecoderInput::BlockStart {
                key,
                kind:
                    BlockKind::ToolUse {
                        id,
                        name,
                        provenance_token,
                    },
            } => {
                self.observe_provenance(provenance_token.as_deref());
                if let Err(skew) = self.assembler.start(key.clone(), id, name, provenance_token) {
                    self.record_skew(&skew);
                    return Vec::new();
                }
                self.transition(BlockState::ToolUseBlock(key));
                Vec::new()
            }
            DecoderInput::BlockDelta {
                delta: BlockDelta::Text(text),
                ..
            } => {
                if text.is_empty() {
                    return Vec::new();
                }
                self.response.text.push_str(&text);
                vec![StreamEvent::ContentDelta { text }]
            }
            DecoderInput::BlockDelta {
                key,
                delta: BlockDelta::Arguments(fragment),
            } => {
                if let Err(skew) = self.assembler.on_fragment(key.clone(), fragment) {
                    self.record_skew(&skew);
                    return Vec::new();
                }
                if self.state == BlockState::Idle {
                    self.transition(BlockState::ToolUseBlock(key));
                }
                Vec::new()
            }
            DecoderInput::BlockStop { key, completion } => {
                if let Some(completion) = &completion {
                    self.observe_provenance(completion.provenance_token.as_deref());
                }
                let events = if completion.is_some() || self.assembler.is_tool_slot(&key) {
                    self.assembler
                        .on_complete(&key, completion)
                        .and_then(|assembled| self.hand_off(assembled))
                        .map(StreamEvent::ToolCallComplete)
                        .into_iter()
                        .collect()
                } else {
                    Vec::new()
                };
                self.transition(BlockState::Idle);
                events
            }
            DecoderInput::MessageStop { reason } => {
                debug!(provider = %self.provider, reason = ?reason, "stop reason received");
                if reason.is_some() {
                    self.response.stop_reason = reason;
                }
                Vec::new()
            }
            DecoderInput::Usage(usage) => {
                self.response.usage = Some(usage);
                Vec::new()
            }
        }
    }

    /// Count a skipped event
    pub fn record_skew(&mut self, skew: &DecodeSkew) {
        warn!(provider = %skew.provider, reason = %skew.reason, "skipping stream event");
        self.response.diagnostics.skipped_events += 1;
    }

    /// End of the provider stream: complete stragglers, then `End`.
    ///
    /// Calling it again yields nothing.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        for call in self.assembler.drain_pending() {
            debug!(provider = %self.provider, id = %call.id, "completing tool call at end of stream");
            if let Some(call) = self.hand_off(Assembled {
                call,
                newly_completed: true,
            }) {
                events.push(StreamEvent::ToolCallComplete(call));
            }
        }
        self.transition(BlockState::Idle);
        self.finished = true;
        events.push(StreamEvent::End);
        events
    }

    pub fn into_response(mut self) -> UnifiedResponse {
        self.response.diagnostics.repaired_arguments = self.assembler.repaired_count();
        self.response
    }

    fn hand_off(&mut self, assembled: Assembled) -> Option<ToolCall> {
        if !assembled.newly_completed {
            debug!(provider = %self.provider, id = %assembled.call.id, "tool call already emitted");
            return None;
        }
        let mut call = assembled.call;
        if call.provenance_token.is_none() && self.policy.provenance == ProvenanceScope::SharedAcrossTurn {
            call.provenance_token = self.shared_provenance.clone();
        }
        self.response.tool_calls.push(call.clone());
        self.response.diagnostics.repaired_arguments = self.assembler.repaired_count();
        Some(call)
    }

    fn observe_provenance(&mut self, token: Option<&str>) {
        if self.shared_provenance.is_none() {
            self.shared_provenance = token.filter(|token| !token.is_empty()).map(str::to_string);
        }
    }

    fn transition(&mut self, next: BlockState) {
        if self.state != next {
            debug!(provider = %self.provider, from = ?self.state, to = ?next, "block state");
            self.state = next;
        }
    }
}
