//! Unistream Core Library
//!
//! Normalizes the streaming protocols of several LLM providers into one
//! conversation model. Provider-native events go in through a
//! [`StreamAdapter`](providers::StreamAdapter), unified
//! [`StreamEvent`](protocol::StreamEvent)s come out through an
//! [`EventSink`](decode::EventSink), and a
//! [`UnifiedResponse`](protocol::UnifiedResponse) is returned at the end.
//!
//! Around the decoder sit a record/replay store for deterministic tests and
//! a dispatcher that falls back through an ordered list of models.

pub mod assembler;
pub mod auth;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod protocol;
pub mod providers;
pub mod recorder;
pub mod usage;

pub use decode::{decode, EventSink, ProviderEventStream, StreamError, TransportError};
pub use dispatch::{Dispatch, DispatchBuilder, DispatchError, DispatchOutcome, EventSource, ResilientDispatcher};
pub use protocol::{ChatRequest, Message, ProviderKind, StreamEvent, ToolCall, UnifiedResponse, UsageRecord};
pub use providers::StreamAdapter;
pub use recorder::{RecorderMode, ReplayStore};

/// Returns the version of the Unistream Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
