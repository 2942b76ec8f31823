//! Configuration validation utilities

use super::env::ENV_VAR_PATTERN;
use super::error::{ValidationError, ValidationErrorKind};
use super::schema::UnistreamConfig;
use crate::recorder::RecorderMode;
use tracing::warn;

/// Configuration validator with rules beyond the schema's own checks
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Reject `${VAR}` placeholders that survived interpolation
    allow_placeholders: bool,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept leftover placeholders, for configs validated before interpolation
    pub fn allowing_placeholders() -> Self {
        Self {
            allow_placeholders: true,
        }
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &UnistreamConfig) -> Result<(), ValidationError> {
        config.validate()?;

        if !self.allow_placeholders {
            self.validate_no_placeholders(config)?;
        }
        self.validate_fixtures_dir(config)?;
        self.check_replay_strictness(config);

        Ok(())
    }

    fn validate_no_placeholders(&self, config: &UnistreamConfig) -> Result<(), ValidationError> {
        let mut fields: Vec<(String, String)> = vec![
            ("dispatch.primary_model".to_string(), config.dispatch.primary_model.clone()),
            ("recorder.test_label".to_string(), config.recorder.test_label.clone()),
        ];
        for (i, model) in config.dispatch.fallback_models.iter().enumerate() {
            fields.push((format!("dispatch.fallback_models[{}]", i), model.clone()));
        }
        if let Some(dir) = &config.recorder.fixtures_dir {
            fields.push(("recorder.fixtures_dir".to_string(), dir.to_string_lossy().into_owned()));
        }

        for (path, value) in fields {
            let vars = self.extract_env_vars(&value);
            if !vars.is_empty() {
                return Err(ValidationError::invalid_format(
                    path,
                    format!("unresolved environment variable(s): {}", vars.join(", ")),
                ));
            }
        }
        Ok(())
    }

    /// Replay needs an existing directory; record creates it on first write
    fn validate_fixtures_dir(&self, config: &UnistreamConfig) -> Result<(), ValidationError> {
        let Some(dir) = &config.recorder.fixtures_dir else {
            return Ok(());
        };

        if dir.is_file() {
            return Err(ValidationError::new(
                "recorder.fixtures_dir",
                ValidationErrorKind::NotADirectory { path: dir.clone() },
            ));
        }

        if config.recorder.mode == RecorderMode::Replay && !dir.exists() {
            return Err(ValidationError::invalid_value(
                "recorder.fixtures_dir",
                "an existing directory in replay mode",
                dir.display().to_string(),
            ));
        }
        Ok(())
    }

    fn check_replay_strictness(&self, config: &UnistreamConfig) {
        if config.recorder.mode.replays() && !config.recorder.exact_match_only {
            warn!(
                label = %config.recorder.test_label,
                "replay may fall back to the most recent capture on request hash mismatch"
            );
        }
    }

    /// Extract environment variable names from a string
    pub fn extract_env_vars(&self, text: &str) -> Vec<String> {
        ENV_VAR_PATTERN
            .captures_iter(text)
            .map(|cap| cap[1].to_string())
            .collect()
    }
}
