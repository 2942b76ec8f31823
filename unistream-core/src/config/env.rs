//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::schema::UnistreamConfig;
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `${VAR}` placeholders
pub(crate) static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern"));

/// Interpolate environment variables in a configuration string
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for cap in ENV_VAR_PATTERN.captures_iter(content) {
        let (Some(full_match), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = env::var(name.as_str()).map_err(|_| ConfigError::EnvVarNotFound {
            var: name.as_str().to_string(),
        })?;
        result.push_str(&content[last..full_match.start()]);
        result.push_str(&value);
        last = full_match.end();
    }
    result.push_str(&content[last..]);

    Ok(result)
}

/// Interpolate the string fields of a configuration built in code
pub fn interpolate_config_env_vars(config: &mut UnistreamConfig) -> Result<(), ConfigError> {
    config.dispatch.primary_model = interpolate_env_vars(&config.dispatch.primary_model)?;
    for model in &mut config.dispatch.fallback_models {
        *model = interpolate_env_vars(model)?;
    }

    if let Some(dir) = &config.recorder.fixtures_dir {
        let raw = dir.to_string_lossy();
        if ENV_VAR_PATTERN.is_match(&raw) {
            let interpolated = interpolate_env_vars(&raw)?;
            config.recorder.fixtures_dir = Some(PathBuf::from(interpolated));
        }
    }

    config.recorder.test_label = interpolate_env_vars(&config.recorder.test_label)?;
    Ok(())
}
