//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use crate::decode::ProvenanceScope;
use crate::protocol::ProviderKind;
use crate::recorder::RecorderMode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Schema versions this crate understands
pub const SUPPORTED_VERSION: &str = "0.1";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UnistreamConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Wire shape of the configured event source
    pub provider: ProviderKind,

    /// Primary and fallback models
    pub dispatch: DispatchConfig,

    /// Decoder settings
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Record/replay settings
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Credential cache settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Custom metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Model selection for the dispatcher
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Model tried first
    pub primary_model: String,

    /// Models tried in order after the primary fails; empty disables fallback
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderConfig {
    /// Capacity of the bounded output channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Override of the provider's provenance token scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceScope>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            provenance: None,
        }
    }
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    #[serde(default)]
    pub mode: RecorderMode,

    /// Directory holding capture files (required unless disabled)
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,

    /// Label scoping captures to one test suite
    #[serde(default = "default_test_label")]
    pub test_label: String,

    /// Disable the most-recent fallback on hash miss
    #[serde(default)]
    pub exact_match_only: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mode: RecorderMode::Disabled,
            fixtures_dir: None,
            test_label: default_test_label(),
            exact_match_only: false,
        }
    }
}

/// Token cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Seconds before expiry at which cached tokens are refreshed
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_skew_secs: default_refresh_skew(),
        }
    }
}

// Default value functions for serde
fn default_channel_capacity() -> usize { 64 }
fn default_test_label() -> String { "default".to_string() }
fn default_refresh_skew() -> i64 { crate::auth::DEFAULT_REFRESH_SKEW_SECS }

const MAX_CHANNEL_CAPACITY: usize = 65_536;
const MAX_REFRESH_SKEW_SECS: i64 = 3_600;

impl UnistreamConfig {
    /// Minimal configuration for a provider and primary model
    pub fn new(provider: ProviderKind, primary_model: impl Into<String>) -> Self {
        Self {
            version: SUPPORTED_VERSION.to_string(),
            provider,
            dispatch: DispatchConfig {
                primary_model: primary_model.into(),
                fallback_models: Vec::new(),
            },
            decoder: DecoderConfig::default(),
            recorder: RecorderConfig::default(),
            auth: AuthConfig::default(),
            metadata: HashMap::new(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != SUPPORTED_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: SUPPORTED_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        self.dispatch.validate("dispatch")?;
        self.decoder.validate("decoder")?;
        self.recorder.validate("recorder")?;
        self.auth.validate("auth")?;
        Ok(())
    }
}

impl DispatchConfig {
    /// Validate model ids
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.primary_model.trim().is_empty() {
            return Err(ValidationError::required(format!("{}.primary_model", path)));
        }

        let mut seen = HashSet::new();
        seen.insert(self.primary_model.as_str());
        for (i, model) in self.fallback_models.iter().enumerate() {
            let model_path = format!("{}.fallback_models[{}]", path, i);
            if model.trim().is_empty() {
                return Err(ValidationError::required(model_path));
            }
            if !seen.insert(model.as_str()) {
                return Err(ValidationError::duplicate(model_path, model.clone()));
            }
        }
        Ok(())
    }
}

impl DecoderConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(ValidationError::out_of_range(
                format!("{}.channel_capacity", path),
                format!("must be between 1 and {}", MAX_CHANNEL_CAPACITY),
            ));
        }
        Ok(())
    }
}

impl RecorderConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.test_label.trim().is_empty() {
            return Err(ValidationError::required(format!("{}.test_label", path)));
        }

        if self.mode != RecorderMode::Disabled {
            match &self.fixtures_dir {
                None => {
                    return Err(ValidationError::required(format!("{}.fixtures_dir", path))
                        .with_context(format!("recorder mode {:?} reads or writes captures", self.mode)));
                }
                Some(dir) if dir.as_os_str().is_empty() => {
                    return Err(ValidationError::required(format!("{}.fixtures_dir", path)));
                }
                Some(_) => {}
            }
        }

        if self.exact_match_only && !self.mode.replays() {
            return Err(ValidationError::incompatible(
                format!("{}.exact_match_only", path),
                "only meaningful when the mode replays captures",
            ));
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if !(0..=MAX_REFRESH_SKEW_SECS).contains(&self.refresh_skew_secs) {
            return Err(ValidationError::out_of_range(
                format!("{}.refresh_skew_secs", path),
                format!("must be between 0 and {}", MAX_REFRESH_SKEW_SECS),
            ));
        }
        Ok(())
    }

    /// Token cache using this refresh skew
    pub fn token_cache(&self) -> crate::auth::TokenCache {
        crate::auth::TokenCache::with_refresh_skew(chrono::Duration::seconds(self.refresh_skew_secs))
    }
}
