//! Environment-variable helpers shared by every `from_env()` constructor.

use std::fmt;
use std::str::FromStr;

/// Why a configuration value could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Failed to read {key} from {path}: {source}")]
    SecretFile {
        key: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Value of `key`, or `default` when unset.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Value of `key`; missing or empty is an error.
pub fn env_required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// Parse `key` into `T`, falling back to `default` when unset.
pub fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Comma-separated list from `key`, falling back to `default`.
pub fn env_list(key: &str, default: &str) -> Vec<String> {
    split_list(&env_or(key, default))
}

/// Split a comma-separated value, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A secret loaded at start-up. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Read `key`, or the file named by `{key}_FILE` (trailing newline
    /// stripped). The direct variable wins when both are set.
    pub fn from_env(key: &'static str) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var(key) {
            return Ok(Self(value));
        }
        let file_key = format!("{key}_FILE");
        let Ok(path) = std::env::var(&file_key) else {
            return Err(ConfigError::Missing(key));
        };
        let contents =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::SecretFile {
                key: file_key,
                path,
                source,
            })?;
        Ok(Self(contents.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***REDACTED***)")
    }
}
