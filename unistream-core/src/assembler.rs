//! Tool-call fragment assembly
//!
//! Accumulates streamed argument fragments per block slot and hands off
//! complete, canonically formatted tool calls. One assembler belongs to one
//! request.

use crate::decode::input::{
    DecoderPolicy, Fragment, FragmentMode, IdentityTiming, SlotKey, StopArguments,
    ToolCompletion,
};
use crate::decode::DecodeSkew;
use crate::protocol::{ProviderKind, ToolCall};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Arguments accumulated so far for one call
#[derive(Debug, Clone, PartialEq)]
enum ArgumentBuffer {
    Text(String),
    Structured(Option<Value>),
}

impl ArgumentBuffer {
    fn for_mode(mode: FragmentMode) -> Self {
        match mode {
            FragmentMode::Concatenate => ArgumentBuffer::Text(String::new()),
            FragmentMode::StructuralMerge => ArgumentBuffer::Structured(None),
        }
    }
}

/// A tool call whose arguments are still streaming
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub key: SlotKey,
    pub id: Option<String>,
    pub name: Option<String>,
    pub provenance_token: Option<String>,
    buffer: ArgumentBuffer,
}

impl PendingToolCall {
    fn new(key: SlotKey, mode: FragmentMode) -> Self {
        Self {
            key,
            id: None,
            name: None,
            provenance_token: None,
            buffer: ArgumentBuffer::for_mode(mode),
        }
    }

    /// Arguments accumulated so far, as text
    pub fn arguments_buffer(&self) -> String {
        match &self.buffer {
            ArgumentBuffer::Text(text) => text.clone(),
            ArgumentBuffer::Structured(Some(value)) => value.to_string(),
            ArgumentBuffer::Structured(None) => String::new(),
        }
    }

    fn fill_identity(&mut self, id: Option<String>, name: Option<String>, overwrite: bool) {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if overwrite || self.id.is_none() {
                self.id = Some(id);
            }
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            if overwrite || self.name.is_none() {
                self.name = Some(name);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Pending(PendingToolCall),
    Completed(ToolCall),
}

/// Result of completing a slot
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub call: ToolCall,
    /// False when the slot had already been completed earlier
    pub newly_completed: bool,
}

/// Per-request tool call assembler
#[derive(Debug)]
pub struct ToolCallAssembler {
    provider: ProviderKind,
    policy: DecoderPolicy,
    slots: HashMap<SlotKey, Slot>,
    order: Vec<SlotKey>,
    repaired: usize,
}

impl ToolCallAssembler {
    /// Create an assembler following a provider's policy
    pub fn new(provider: ProviderKind, policy: DecoderPolicy) -> Self {
        Self {
            provider,
            policy,
            slots: HashMap::new(),
            order: Vec::new(),
            repaired: 0,
        }
    }

    /// Whether the slot belongs to a tool call (pending or completed)
    pub fn is_tool_slot(&self, key: &SlotKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of calls still accumulating
    pub fn pending_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }

    /// Pending call at a slot
    pub fn pending(&self, key: &SlotKey) -> Option<&PendingToolCall> {
        match self.slots.get(key) {
            Some(Slot::Pending(pending)) => Some(pending),
            _ => None,
        }
    }

    /// Call id bound to a slot, if known
    pub fn id_for(&self, key: &SlotKey) -> Option<&str> {
        match self.slots.get(key)? {
            Slot::Pending(pending) => pending.id.as_deref(),
            Slot::Completed(call) => Some(call.id.as_str()),
        }
    }

    /// Calls whose arguments had to be replaced with `{}`
    pub fn repaired_count(&self) -> usize {
        self.repaired
    }

    /// Register a call on an explicit block start
    pub fn start(
        &mut self,
        key: SlotKey,
        id: Option<String>,
        name: Option<String>,
        provenance_token: Option<String>,
    ) -> Result<(), DecodeSkew> {
        let pending = self.pending_mut(&key)?;
        pending.fill_identity(id, name, false);
        if pending.provenance_token.is_none() {
            pending.provenance_token = provenance_token;
        }
        Ok(())
    }

    /// Add an argument fragment, creating the call on first sight
    pub fn on_fragment(&mut self, key: SlotKey, fragment: Fragment) -> Result<(), DecodeSkew> {
        let provider = self.provider;
        let pending = self.pending_mut(&key)?;
        match (&mut pending.buffer, fragment) {
            (ArgumentBuffer::Text(text), Fragment::Raw(raw)) => text.push_str(&raw),
            (ArgumentBuffer::Text(text), Fragment::Object(value)) => {
                text.push_str(&value.to_string())
            }
            (ArgumentBuffer::Structured(merged), Fragment::Object(value)) => {
                merge_into(merged, value)
            }
            (ArgumentBuffer::Structured(merged), Fragment::Raw(raw)) => {
                let value = serde_json::from_str(&raw).map_err(|err| {
                    DecodeSkew::new(
                        provider,
                        format!("argument fragment for slot {} is not an object: {}", key, err),
                    )
                })?;
                merge_into(merged, value)
            }
        }
        Ok(())
    }

    /// Finalize a slot and hand off the assembled call.
    ///
    /// Completing a slot twice returns the first result unchanged. A slot that
    /// was never started is created from the completion data when present.
    pub fn on_complete(
        &mut self,
        key: &SlotKey,
        completion: Option<ToolCompletion>,
    ) -> Option<Assembled> {
        match self.slots.get(key) {
            Some(Slot::Completed(call)) => {
                return Some(Assembled {
                    call: call.clone(),
                    newly_completed: false,
                });
            }
            Some(Slot::Pending(_)) => {}
            None if completion.is_some() => {
                self.order.push(key.clone());
                self.slots.insert(
                    key.clone(),
                    Slot::Pending(PendingToolCall::new(key.clone(), self.policy.fragments)),
                );
            }
            None => return None,
        }

        let Some(Slot::Pending(mut pending)) = self.slots.remove(key) else {
            return None;
        };
        if let Some(completion) = completion {
            self.apply_completion(&mut pending, completion);
        }
        let call = self.finalize(pending);
        self.slots.insert(key.clone(), Slot::Completed(call.clone()));
        Some(Assembled {
            call,
            newly_completed: true,
        })
    }

    /// Complete every still-pending call, in the order they were created
    pub fn drain_pending(&mut self) -> Vec<ToolCall> {
        let keys: Vec<SlotKey> = self
            .order
            .iter()
            .filter(|key| matches!(self.slots.get(*key), Some(Slot::Pending(_))))
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| self.on_complete(key, None))
            .filter(|assembled| assembled.newly_completed)
            .map(|assembled| assembled.call)
            .collect()
    }

    fn pending_mut(&mut self, key: &SlotKey) -> Result<&mut PendingToolCall, DecodeSkew> {
        if !self.slots.contains_key(key) {
            self.order.push(key.clone());
            self.slots.insert(
                key.clone(),
                Slot::Pending(PendingToolCall::new(key.clone(), self.policy.fragments)),
            );
        }
        match self.slots.get_mut(key) {
            Some(Slot::Pending(pending)) => Ok(pending),
            _ => Err(DecodeSkew::new(
                self.provider,
                format!("slot {} already completed", key),
            )),
        }
    }

    fn apply_completion(&self, pending: &mut PendingToolCall, completion: ToolCompletion) {
        let overwrite = self.policy.identity == IdentityTiming::AtBlockStop;
        pending.fill_identity(completion.id, completion.name, overwrite);
        if let Some(token) = completion.provenance_token {
            if overwrite || pending.provenance_token.is_none() {
                pending.provenance_token = Some(token);
            }
        }
        if let Some(arguments) = completion.arguments {
            match self.policy.stop_arguments {
                StopArguments::Authoritative => {
                    pending.buffer = ArgumentBuffer::Text(arguments);
                }
                StopArguments::SignalOnly => {
                    debug!(slot = %pending.key, "ignoring arguments repeated on block stop");
                }
            }
        }
    }

    fn finalize(&mut self, pending: PendingToolCall) -> ToolCall {
        let arguments = match pending.buffer {
            ArgumentBuffer::Text(text) if text.trim().is_empty() => empty_object(),
            ArgumentBuffer::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => value.to_string(),
                Err(err) => {
                    warn!(
                        provider = %self.provider,
                        slot = %pending.key,
                        error = %err,
                        raw = %truncate(&text, 200),
                        "tool call arguments are not valid JSON, replacing with {{}}"
                    );
                    self.repaired += 1;
                    empty_object()
                }
            },
            ArgumentBuffer::Structured(Some(value)) => value.to_string(),
            ArgumentBuffer::Structured(None) => empty_object(),
        };

        let id = pending
            .id
            .unwrap_or_else(|| format!("call_{}", pending.key));
        let name = pending.name.unwrap_or_else(|| {
            warn!(provider = %self.provider, slot = %pending.key, "tool call completed without a name");
            String::new()
        });

        ToolCall {
            id,
            name,
            arguments,
            provenance_token: pending.provenance_token,
        }
    }
}

fn empty_object() -> String {
    Value::Object(Map::new()).to_string()
}

fn merge_into(target: &mut Option<Value>, patch: Value) {
    match target {
        Some(existing) => merge_json(existing, patch),
        None => *target = Some(patch),
    }
}

/// Objects merge key-wise and recursively; anything else replaces.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
