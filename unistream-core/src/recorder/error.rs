//! Recorder error types

use crate::decode::DecodeSkew;
use crate::protocol::ProviderKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// No capture exists for the request; distinct from any provider failure
    #[error("no capture for {provider} model '{model}' under label '{label}' (request hash {hash})")]
    ReplayNotFound {
        provider: ProviderKind,
        model: String,
        label: String,
        hash: String,
    },

    #[error("capture I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capture serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted response cannot be expanded into native events
    #[error("capture cannot be replayed: {0}")]
    Unreplayable(#[from] DecodeSkew),
}

impl RecorderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::Io {
            path: path.into(),
            source,
        }
    }
}
