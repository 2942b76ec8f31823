//! Live provider event sources

use crate::decode::{ProviderEventStream, TransportError};
use crate::protocol::{ChatRequest, ProviderKind};
use async_trait::async_trait;

/// Opens a provider-native event stream for a request
///
/// Implementations own the transport: connection handling, SSE framing and
/// credentials. The decoder only sees parsed JSON events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wire shape of the events this source yields
    fn provider(&self) -> ProviderKind;

    /// Start streaming a response for `request`
    async fn open(&self, request: &ChatRequest) -> Result<ProviderEventStream, TransportError>;
}
