//! Dispatch error types

use crate::decode::StreamError;
use crate::recorder::RecorderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why one pipeline attempt failed
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

impl AttemptError {
    /// Errors that are not the model's fault; trying another model cannot help
    pub fn ends_dispatch(&self) -> bool {
        match self {
            AttemptError::Stream(err) => err.is_caller_initiated(),
            AttemptError::Recorder(_) => true,
        }
    }
}

/// A failed attempt against one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Every model failed; the primary's error is the cause
    #[error("all {} models failed, primary '{model}': {cause}", attempts.len())]
    Exhausted {
        model: String,
        #[source]
        cause: AttemptError,
        attempts: Vec<ModelFailure>,
    },

    #[error("dispatch cancelled")]
    Cancelled,

    #[error("event consumer disconnected")]
    Disconnected,

    #[error(transparent)]
    Recorder(RecorderError),
}

impl DispatchError {
    /// Error for an attempt that stopped the fallback loop
    pub(crate) fn stopped(err: AttemptError, model: &str, attempts: Vec<ModelFailure>) -> Self {
        match err {
            AttemptError::Stream(StreamError::Cancelled) => DispatchError::Cancelled,
            AttemptError::Stream(StreamError::Disconnected) => DispatchError::Disconnected,
            AttemptError::Recorder(err) => DispatchError::Recorder(err),
            cause @ AttemptError::Stream(StreamError::Transport(_)) => DispatchError::Exhausted {
                model: model.to_string(),
                cause,
                attempts,
            },
        }
    }

    pub fn is_replay_not_found(&self) -> bool {
        matches!(
            self,
            DispatchError::Recorder(RecorderError::ReplayNotFound { .. })
        )
    }
}

/// Errors building a dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("an event source is required")]
    MissingSource,

    #[error("a primary model is required")]
    MissingPrimaryModel,

    #[error("the recorder mode '{0:?}' needs a replay store")]
    MissingStore(crate::recorder::RecorderMode),

    #[error("configured for {configured} but the event source speaks {actual}")]
    ProviderMismatch {
        configured: crate::protocol::ProviderKind,
        actual: crate::protocol::ProviderKind,
    },
}
