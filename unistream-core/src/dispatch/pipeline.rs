//! One request through replay or live decode, with optional capture

use super::error::AttemptError;
use super::source::EventSource;
use crate::decode::{decode_with_policy, DecoderPolicy, EventSink, ProvenanceScope, StreamError};
use crate::protocol::{ChatRequest, ProviderKind, UnifiedResponse};
use crate::recorder::{CaptureTap, MatchKind, RecorderError, RecorderMode, ReplayStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a pipeline's response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Live,
    Replayed(MatchKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub response: UnifiedResponse,
    pub source: ResponseSource,
}

/// Event source plus decoder plus optional replay store
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn EventSource>,
    store: Option<ReplayStore>,
    mode: RecorderMode,
    provenance: Option<ProvenanceScope>,
}

impl Pipeline {
    /// Live-only pipeline
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            source,
            store: None,
            mode: RecorderMode::Disabled,
            provenance: None,
        }
    }

    /// Attach a replay store used according to `mode`
    pub fn with_recorder(mut self, store: ReplayStore, mode: RecorderMode) -> Self {
        self.store = Some(store);
        self.mode = mode;
        self
    }

    /// Override the provider's provenance scope
    pub fn with_provenance(mut self, provenance: ProvenanceScope) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.source.provider()
    }

    pub fn mode(&self) -> RecorderMode {
        self.mode
    }

    fn policy(&self) -> DecoderPolicy {
        let policy = self.provider().policy();
        match self.provenance {
            Some(scope) => policy.with_provenance(scope),
            None => policy,
        }
    }

    /// Run one request to completion
    pub async fn run(
        &self,
        request: &ChatRequest,
        sink: &EventSink,
    ) -> Result<PipelineOutput, AttemptError> {
        let provider = self.provider();
        let store = self.store.as_ref().filter(|_| self.mode != RecorderMode::Disabled);

        if let Some(store) = store.filter(|_| self.mode.replays()) {
            match store.load(provider, request) {
                Ok(loaded) => {
                    let mut adapter = provider.adapter();
                    let events = loaded.exchange.replay_stream(adapter.as_ref())?;
                    debug!(path = %loaded.path.display(), match_kind = ?loaded.match_kind, "replaying capture");
                    let response =
                        decode_with_policy(adapter.as_mut(), events, sink, &request.model, self.policy())
                            .await?;
                    return Ok(PipelineOutput {
                        response,
                        source: ResponseSource::Replayed(loaded.match_kind),
                    });
                }
                Err(RecorderError::ReplayNotFound { .. }) if self.mode == RecorderMode::ReplayOrRecord => {
                    debug!(model = %request.model, "no capture, going live");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let cancel = sink.cancellation();
        let events = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled.into()),
            opened = self.source.open(request) => opened.map_err(StreamError::Transport)?,
        };

        let mut adapter = provider.adapter();
        let Some(store) = store.filter(|_| self.mode.records()) else {
            let response =
                decode_with_policy(adapter.as_mut(), events, sink, &request.model, self.policy())
                    .await?;
            return Ok(PipelineOutput {
                response,
                source: ResponseSource::Live,
            });
        };

        let (events, tap) = CaptureTap::wrap(events);
        let response =
            decode_with_policy(adapter.as_mut(), events, sink, &request.model, self.policy()).await?;
        if let Err(err) = store.record(provider, request, tap.into_response_data()) {
            warn!(model = %request.model, error = %err, "failed to persist capture");
        }
        Ok(PipelineOutput {
            response,
            source: ResponseSource::Live,
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("provider", &self.provider())
            .field("store", &self.store)
            .field("mode", &self.mode)
            .field("provenance", &self.provenance)
            .finish()
    }
}
