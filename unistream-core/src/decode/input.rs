//! Decoder input variants and per-provider decoding policy
//!
//! Every provider adapter translates its native events into this closed set,
//! so the state machine never sees a vendor type.

use crate::protocol::UsageRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a block within one response
///
/// Providers address blocks either positionally or by an id they issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    Index(u32),
    Id(String),
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Index(index) => write!(f, "{}", index),
            SlotKey::Id(id) => f.write_str(id),
        }
    }
}

/// One incremental piece of a tool call's arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Raw JSON text, possibly split mid-token
    Raw(String),
    /// A fully formed partial object
    Object(serde_json::Value),
}

/// What a started block will carry
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Text,
    ToolUse {
        id: Option<String>,
        name: Option<String>,
        provenance_token: Option<String>,
    },
}

/// Payload of a block delta
#[derive(Debug, Clone, PartialEq)]
pub enum BlockDelta {
    Text(String),
    Arguments(Fragment),
}

/// Data a provider attaches to the end of a tool-use block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCompletion {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Complete arguments repeated by the provider
    pub arguments: Option<String>,
    pub provenance_token: Option<String>,
}

/// The closed set of inputs the stream state machine understands
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderInput {
    BlockStart {
        key: SlotKey,
        kind: BlockKind,
    },
    BlockDelta {
        key: SlotKey,
        delta: BlockDelta,
    },
    BlockStop {
        key: SlotKey,
        completion: Option<ToolCompletion>,
    },
    MessageStop {
        reason: Option<String>,
    },
    Usage(UsageRecord),
}

impl DecoderInput {
    /// Text delta for a block
    pub fn text(key: SlotKey, text: impl Into<String>) -> Self {
        DecoderInput::BlockDelta {
            key,
            delta: BlockDelta::Text(text.into()),
        }
    }

    /// Raw JSON argument fragment for a block
    pub fn raw_arguments(key: SlotKey, fragment: impl Into<String>) -> Self {
        DecoderInput::BlockDelta {
            key,
            delta: BlockDelta::Arguments(Fragment::Raw(fragment.into())),
        }
    }

    /// Start of a tool-use block
    pub fn tool_start(key: SlotKey, id: Option<String>, name: Option<String>) -> Self {
        DecoderInput::BlockStart {
            key,
            kind: BlockKind::ToolUse {
                id,
                name,
                provenance_token: None,
            },
        }
    }

    /// End of a block with nothing attached
    pub fn stop(key: SlotKey) -> Self {
        DecoderInput::BlockStop {
            key,
            completion: None,
        }
    }
}

/// When a provider reveals a tool call's id and name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityTiming {
    AtBlockStart,
    AtBlockStop,
}

/// How argument fragments combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentMode {
    /// String concatenation of raw JSON text
    Concatenate,
    /// Recursive key-wise merge of partial objects
    StructuralMerge,
}

/// Meaning of arguments repeated on block stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopArguments {
    /// Repeated arguments override the accumulated fragments
    Authoritative,
    /// Block stop only signals completion
    SignalOnly,
}

/// Whether one provenance token covers every call in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceScope {
    PerCall,
    SharedAcrossTurn,
}

/// Provider-declared decoding behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderPolicy {
    pub identity: IdentityTiming,
    pub fragments: FragmentMode,
    pub stop_arguments: StopArguments,
    pub provenance: ProvenanceScope,
}

impl DecoderPolicy {
    /// Raw JSON fragments, identity up front, stop only signals
    pub const fn incremental_json() -> Self {
        Self {
            identity: IdentityTiming::AtBlockStart,
            fragments: FragmentMode::Concatenate,
            stop_arguments: StopArguments::SignalOnly,
            provenance: ProvenanceScope::PerCall,
        }
    }

    /// Replace the provenance scope
    pub fn with_provenance(mut self, provenance: ProvenanceScope) -> Self {
        self.provenance = provenance;
        self
    }
}

impl Default for DecoderPolicy {
    fn default() -> Self {
        Self::incremental_json()
    }
}
