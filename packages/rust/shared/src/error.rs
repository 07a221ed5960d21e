//! Error types for heirdesk.
//!
//! Library crates use [`HeirdeskError`] via `thiserror`; boundary crates add
//! their own classified errors (fetch, search, completion) that convert into it.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for heirdesk operations.
#[derive(Debug, thiserror::Error)]
pub enum HeirdeskError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the classified fetch/search paths.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or completion parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Record store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown field key, malformed record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HeirdeskError>;

impl HeirdeskError {
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
        let err = HeirdeskError::config("missing GOOGLE_API_KEYS");
        assert_eq!(err.to_string(), "config error: missing GOOGLE_API_KEYS");

        let err = HeirdeskError::validation("unknown field key 'fax'");
        assert!(err.to_string().contains("'fax'"));
    }

    #[test]
    fn io_error_keeps_path() {
        let err = HeirdeskError::io(
            "/tmp/heirdesk.db",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/heirdesk.db"));
    }
}
