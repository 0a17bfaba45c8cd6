//! Error types for parameter resolution

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning the config file and overrides into a
/// [`ParameterSet`](crate::ParameterSet).
///
/// Every variant names the section and key involved so the CLI can print a
/// diagnostic without further context.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The `{app}-{env}` section selected by the resolved environment is absent
    #[error("[C001] Configuration section '[{section}]' not found in {origin}\n\nAdd a [{section}] table or pass a different --app/--env.")]
    MissingSection { section: String, origin: String },

    /// A required key has no non-empty value in any source
    #[error("[C002] Missing required key '{key}' (looked in overrides and section '[{section}]')")]
    MissingKey { section: String, key: String },

    /// A value was found but cannot be interpreted
    #[error("[C003] Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("[C004] Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[C005] Failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
}

impl ConfigError {
    pub(crate) fn missing_key(section: &str, key: &str) -> Self {
        Self::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid_value(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Short code used in log lines, e.g. `C001`
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSection { .. } => "C001",
            Self::MissingKey { .. } => "C002",
            Self::InvalidValue { .. } => "C003",
            Self::Read { .. } => "C004",
            Self::Parse { .. } => "C005",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
