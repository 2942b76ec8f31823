//! Configuration module for Unistream
//!
//! YAML or JSON documents describing which provider shape to decode, the
//! model fallback order, the decoder channel and the record/replay store.
//! `${VAR}` placeholders are resolved from the environment before parsing.

mod env;
mod error;
mod schema;
mod validator;

pub use env::{interpolate_config_env_vars, interpolate_env_vars};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    AuthConfig, DecoderConfig, DispatchConfig, RecorderConfig, UnistreamConfig, SUPPORTED_VERSION,
};
pub use validator::ConfigValidator;

use crate::decode::EventSink;
use crate::recorder::ReplayStore;
use std::fs;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<UnistreamConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_yaml(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<UnistreamConfig> {
    let path = path.as_ref();
    let content = read(path)?;

    // Interpolate environment variables before parsing
    let interpolated = env::interpolate_env_vars(&content)?;

    let mut config: UnistreamConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish(&mut config)?;
    Ok(config)
}

/// Parse a YAML document held in memory
pub fn from_yaml_str(content: &str) -> ConfigResult<UnistreamConfig> {
    parse_yaml(content, "<inline>")
}

fn read(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn parse_yaml(content: &str, origin: &str) -> ConfigResult<UnistreamConfig> {
    let interpolated = env::interpolate_env_vars(content)?;

    let mut config: UnistreamConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish(&mut config)?;
    Ok(config)
}

fn finish(config: &mut UnistreamConfig) -> ConfigResult<()> {
    env::interpolate_config_env_vars(config)?;
    ConfigValidator::new().validate(config)?;
    Ok(())
}

impl UnistreamConfig {
    /// Replay store described by the recorder section, if recording or replaying
    pub fn replay_store(&self) -> Option<ReplayStore> {
        if self.recorder.mode == crate::recorder::RecorderMode::Disabled {
            return None;
        }
        let dir = self.recorder.fixtures_dir.as_ref()?;
        Some(
            ReplayStore::new(dir, &self.recorder.test_label)
                .with_exact_match_only(self.recorder.exact_match_only),
        )
    }

    /// Bounded event channel sized by the decoder section
    pub fn event_channel(
        &self,
        cancel: CancellationToken,
    ) -> (EventSink, tokio::sync::mpsc::Receiver<crate::protocol::StreamEvent>) {
        EventSink::channel(self.decoder.channel_capacity, cancel)
    }
}
