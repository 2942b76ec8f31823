//! Redacted string wrapper for credentials

use serde::{Deserialize, Serialize};
use std::fmt;

/// A credential that never prints its value
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw value; keep it out of logs
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Last four characters only, for telling tokens apart in diagnostics
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.value.chars().collect();
        if chars.len() <= 8 {
            return "[REDACTED]".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("...{}", tail)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted_in_output() {
        let secret = SecretString::new("ya29.a0AfH6SMBexample");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.expose_secret(), "ya29.a0AfH6SMBexample");
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(SecretString::new("short").fingerprint(), "[REDACTED]");
        assert_eq!(SecretString::new("0123456789abcd").fingerprint(), "...abcd");
    }

    #[test]
    fn test_serializes_transparently() {
        let secret = SecretString::new("t");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"t\"");
    }
}
