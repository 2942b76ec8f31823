//! Resilient dispatch across models
//!
//! A [`Pipeline`] runs one request against one provider, serving it from a
//! capture or decoding it live. A [`ResilientDispatcher`] runs the pipeline
//! for a primary model and falls back through an ordered model list.

pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod source;

pub use dispatcher::{Dispatch, DispatchBuilder, DispatchOutcome, ResilientDispatcher};
pub use error::{AttemptError, BuildError, DispatchError, ModelFailure};
pub use pipeline::{Pipeline, PipelineOutput, ResponseSource};
pub use source::EventSource;
