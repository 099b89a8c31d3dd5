//! Error types for the Hybrid CI/CD marketplace crates.
//!
//! Library crates use [`HybridCiError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all marketplace and chain operations.
#[derive(Debug, thiserror::Error)]
pub enum HybridCiError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery or manifest fetch.
    #[error("network error: {0}")]
    Network(String),

    /// Manifest could not be deserialized.
    #[error("{message}")]
    Parse { message: String },

    /// A record was built from input that did not pass validation.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A stage asked for a context key that no earlier stage inserted.
    #[error("context key '{key}' is missing or has an unexpected type")]
    MissingKey { key: String },

    /// Chain wiring error (unknown link, duplicate name, cycle).
    #[error("chain error: {0}")]
    Chain(String),

    /// Event or record store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HybridCiError>;

impl HybridCiError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a missing-key error for a context lookup.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = HybridCiError::config("missing token");
        assert_eq!(err.to_string(), "config error: missing token");

        let err = HybridCiError::parse("Failed to parse config c1: bad indent");
        assert_eq!(err.to_string(), "Failed to parse config c1: bad indent");

        let err = HybridCiError::missing_key("record");
        assert!(err.to_string().contains("'record'"));
    }
}
