//! Decoder error types

use crate::protocol::ProviderKind;
use std::time::Duration;
use thiserror::Error;

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, StreamError>;

/// Failures of the provider event stream itself
///
/// Fatal to the current decode attempt; the dispatcher falls back on these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Service temporarily unavailable
    #[error("Service temporarily unavailable: {0}")]
    ServiceUnavailable(String),

    /// Timeout occurred
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Provider returned an error event or status
    #[error("Provider error: {code}: {message}")]
    Provider { code: String, message: String },
}

/// Errors that end a decode
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// The provider stream failed
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The caller's cancellation token fired
    #[error("decode cancelled")]
    Cancelled,

    /// The consumer dropped its receiving end of the output channel
    #[error("event consumer disconnected")]
    Disconnected,
}

impl StreamError {
    /// Whether this error ended the decode because of the caller rather than the model
    pub fn is_caller_initiated(&self) -> bool {
        matches!(self, StreamError::Cancelled | StreamError::Disconnected)
    }
}

/// A single malformed or unexpected event
///
/// Never fatal: the decoder logs it, counts it and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{provider} event skipped: {reason}")]
pub struct DecodeSkew {
    pub provider: ProviderKind,
    pub reason: String,
}

impl DecodeSkew {
    /// Create a skew for a provider
    pub fn new(provider: ProviderKind, reason: impl Into<String>) -> Self {
        Self {
            provider,
            reason: reason.into(),
        }
    }

    /// Skew caused by an event that does not fit the typed envelope
    pub fn from_serde(provider: ProviderKind, err: serde_json::Error) -> Self {
        Self::new(provider, format!("unrecognized event shape: {}", err))
    }
}
