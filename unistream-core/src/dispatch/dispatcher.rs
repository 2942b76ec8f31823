//! Primary-then-fallback model dispatch
//!
//! Tries the primary model, then each fallback model in order, strictly
//! sequentially. The first successful decode wins, even if it is empty.

use super::error::{AttemptError, BuildError, DispatchError, ModelFailure};
use super::pipeline::{Pipeline, ResponseSource};
use super::source::EventSource;
use crate::config::UnistreamConfig;
use crate::decode::{EventSink, ProvenanceScope};
use crate::protocol::{ChatRequest, UnifiedResponse};
use crate::recorder::{RecorderMode, ReplayStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// The decoded response
    pub response: UnifiedResponse,

    /// Which model ultimately produced it
    pub model_used: String,

    /// Whether a fallback model was used
    pub used_fallback: bool,

    /// Number of models tried
    pub attempts: usize,

    /// Failures of the models tried before the successful one
    pub model_errors: Vec<ModelFailure>,

    /// Id carried by this dispatch's tracing span
    pub request_id: Uuid,

    /// Live or replayed
    pub source: ResponseSource,
}

/// Trait for dispatch strategies
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Run the request, streaming events into `sink`
    ///
    /// Events already sent by a failed attempt are not retracted: the sink
    /// may carry deltas and even `ToolCallComplete`s from a model that later
    /// failed, followed by the events of the model that succeeded. Only one
    /// `End` is sent, by the successful attempt. Consumers that act on tool
    /// calls or keep the final text must use the returned
    /// [`DispatchOutcome::response`], not the concatenated stream.
    async fn dispatch(
        &self,
        request: ChatRequest,
        sink: &EventSink,
    ) -> Result<DispatchOutcome, DispatchError>;

    /// Models in the order they are tried
    fn models(&self) -> Vec<String>;
}

/// Primary model with ordered fallbacks
#[derive(Debug, Clone)]
pub struct ResilientDispatcher {
    pipeline: Pipeline,
    primary_model: String,
    fallback_models: Vec<String>,
}

impl ResilientDispatcher {
    pub fn new(pipeline: Pipeline, primary_model: impl Into<String>) -> Self {
        Self {
            pipeline,
            primary_model: primary_model.into(),
            fallback_models: Vec::new(),
        }
    }

    /// Replace the fallback list; empty disables fallback
    pub fn with_fallbacks(mut self, fallback_models: Vec<String>) -> Self {
        self.fallback_models = fallback_models;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    async fn run_models(
        &self,
        request: ChatRequest,
        sink: &EventSink,
        request_id: Uuid,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut model_errors = Vec::new();
        let mut primary_error: Option<AttemptError> = None;
        let models = self.models();

        for (index, model) in models.iter().enumerate() {
            let attempt = request.for_model(model.clone());
            match self.pipeline.run(&attempt, sink).await {
                Ok(output) => {
                    if output.response.is_empty() {
                        warn!(model = %model, stop_reason = ?output.response.stop_reason, "model returned an empty response");
                    }
                    info!(
                        model = %model,
                        attempts = index + 1,
                        used_fallback = index > 0,
                        source = ?output.source,
                        "dispatch succeeded"
                    );
                    return Ok(DispatchOutcome {
                        response: output.response,
                        model_used: model.clone(),
                        used_fallback: index > 0,
                        attempts: index + 1,
                        model_errors,
                        request_id,
                        source: output.source,
                    });
                }
                Err(err) if err.ends_dispatch() => {
                    info!(model = %model, error = %err, "dispatch stopped");
                    return Err(DispatchError::stopped(err, model, model_errors));
                }
                Err(err) => {
                    warn!(model = %model, error = %err, "model attempt failed");
                    model_errors.push(ModelFailure {
                        model: model.clone(),
                        error: err.to_string(),
                    });
                    if primary_error.is_none() {
                        primary_error = Some(err);
                    }
                }
            }
        }

        match primary_error {
            Some(cause) => Err(DispatchError::Exhausted {
                model: self.primary_model.clone(),
                cause,
                attempts: model_errors,
            }),
            // models() always holds the primary, so some attempt ran
            None => Err(DispatchError::Cancelled),
        }
    }
}

#[async_trait]
impl Dispatch for ResilientDispatcher {
    async fn dispatch(
        &self,
        request: ChatRequest,
        sink: &EventSink,
    ) -> Result<DispatchOutcome, DispatchError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            provider = %self.pipeline.provider(),
            primary = %self.primary_model,
        );
        self.run_models(request, sink, request_id)
            .instrument(span)
            .await
    }

    fn models(&self) -> Vec<String> {
        let mut models = vec![self.primary_model.clone()];
        models.extend(self.fallback_models.iter().cloned());
        models
    }
}

/// Builder for creating dispatchers
#[derive(Default)]
pub struct DispatchBuilder {
    source: Option<Arc<dyn EventSource>>,
    primary_model: Option<String>,
    fallback_models: Vec<String>,
    store: Option<ReplayStore>,
    mode: RecorderMode,
    provenance: Option<ProvenanceScope>,
}

impl DispatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from a validated configuration
    pub fn from_config(config: &UnistreamConfig, source: Arc<dyn EventSource>) -> Result<Self, BuildError> {
        if source.provider() != config.provider {
            return Err(BuildError::ProviderMismatch {
                configured: config.provider,
                actual: source.provider(),
            });
        }

        let mut builder = Self::new()
            .source(source)
            .primary_model(config.dispatch.primary_model.clone());
        for model in &config.dispatch.fallback_models {
            builder = builder.fallback_model(model.clone());
        }
        if let Some(store) = config.replay_store() {
            builder = builder.recorder(store, config.recorder.mode);
        } else if config.recorder.mode != RecorderMode::Disabled {
            return Err(BuildError::MissingStore(config.recorder.mode));
        }
        if let Some(provenance) = config.decoder.provenance {
            builder = builder.provenance(provenance);
        }
        Ok(builder)
    }

    pub fn source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.primary_model = Some(model.into());
        self
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_models.push(model.into());
        self
    }

    pub fn recorder(mut self, store: ReplayStore, mode: RecorderMode) -> Self {
        self.store = Some(store);
        self.mode = mode;
        self
    }

    pub fn provenance(mut self, provenance: ProvenanceScope) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn build(self) -> Result<ResilientDispatcher, BuildError> {
        let source = self.source.ok_or(BuildError::MissingSource)?;
        let primary_model = self
            .primary_model
            .filter(|model| !model.trim().is_empty())
            .ok_or(BuildError::MissingPrimaryModel)?;

        let mut pipeline = Pipeline::new(source);
        match self.store {
            Some(store) => pipeline = pipeline.with_recorder(store, self.mode),
            None if self.mode != RecorderMode::Disabled => {
                return Err(BuildError::MissingStore(self.mode));
            }
            None => {}
        }
        if let Some(provenance) = self.provenance {
            pipeline = pipeline.with_provenance(provenance);
        }

        Ok(ResilientDispatcher::new(pipeline, primary_model).with_fallbacks(self.fallback_models))
    }
}
