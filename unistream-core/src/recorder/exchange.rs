//! Persisted request/response captures

use super::canonical::CanonicalRequest;
use super::error::RecorderResult;
use crate::decode::ProviderEventStream;
use crate::protocol::{ChatRequest, ProviderKind};
use crate::providers::StreamAdapter;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What was captured from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Native stream events in arrival order
    Stream(Vec<Value>),
    /// A single non-streaming response object
    Complete(Value),
}

impl ResponseData {
    /// Number of native events stored
    pub fn chunk_count(&self) -> usize {
        match self {
            ResponseData::Stream(events) => events.len(),
            ResponseData::Complete(_) => 1,
        }
    }

    /// Native events to feed the decoder.
    ///
    /// Streams replay as-is; a complete response is expanded by the adapter.
    pub fn native_events(&self, adapter: &dyn StreamAdapter) -> RecorderResult<Vec<Value>> {
        match self {
            ResponseData::Stream(events) => Ok(events.clone()),
            ResponseData::Complete(response) => Ok(adapter.synthesize_events(response)?),
        }
    }
}

/// One capture file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedExchange {
    pub provider: ProviderKind,
    pub model_id: String,
    pub test_label: String,
    pub recorded_at: DateTime<Utc>,
    pub request_hash: String,
    pub request: CanonicalRequest,
    pub response_data: ResponseData,
    pub chunk_count: usize,
}

impl RecordedExchange {
    /// Capture a response for a request, stamped now
    pub fn new(
        provider: ProviderKind,
        request: &ChatRequest,
        test_label: impl Into<String>,
        response_data: ResponseData,
    ) -> RecorderResult<Self> {
        let canonical = CanonicalRequest::from_request(request)?;
        let request_hash = canonical.hash()?;
        Ok(Self {
            provider,
            model_id: request.model.clone(),
            test_label: test_label.into(),
            recorded_at: Utc::now(),
            request_hash,
            request: canonical,
            chunk_count: response_data.chunk_count(),
            response_data,
        })
    }

    /// Replay the capture as a provider event stream
    pub fn replay_stream(&self, adapter: &dyn StreamAdapter) -> RecorderResult<ProviderEventStream> {
        let events = self.response_data.native_events(adapter)?;
        Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
