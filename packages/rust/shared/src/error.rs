//! Error types for notefold.
//!
//! Library crates use [`NotefoldError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Stage-scoped failures are `Err(NotefoldError)`. Per-document failures are
//! never raised; they are collected as [`crate::Issue`] values instead.

use std::path::PathBuf;

/// Top-level error type for all notefold operations.
#[derive(Debug, thiserror::Error)]
pub enum NotefoldError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Text or serialized-state parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad input layout, invalid argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Unbalanced or nested attachment markers within one document.
    #[error("malformed markers in {scope}: {message}")]
    MalformedMarkers { scope: String, message: String },

    /// An external collaborator (converter, codec, describer) failed.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Persisted state store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted state failed its integrity check.
    #[error("state integrity check failed for {path:?}: expected {expected}, found {actual}")]
    StateIntegrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A transient filesystem error persisted past the retry budget.
    #[error("{operation} on {path:?} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        path: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    /// The input tree contained no markdown documents.
    #[error("no markdown documents found under {path:?}")]
    NoInput { path: PathBuf },

    /// The run was cancelled between documents.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NotefoldError>;

impl NotefoldError {
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

    /// Create a malformed-marker error scoped to one document.
    pub fn malformed(scope: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedMarkers {
            scope: scope.into(),
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
        let err = NotefoldError::config("workers must be greater than zero");
        assert_eq!(
            err.to_string(),
            "config error: workers must be greater than zero"
        );

        let err = NotefoldError::malformed("notes/a.md", "nested start marker at line 4");
        assert!(err.to_string().contains("notes/a.md"));
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn retry_exhausted_mentions_attempts() {
        let err = NotefoldError::RetryExhausted {
            operation: "write".into(),
            path: PathBuf::from("/tmp/out.md"),
            attempts: 4,
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk"),
        };
        let text = err.to_string();
        assert!(text.contains("after 4 attempts"));
        assert!(text.contains("slow disk"));
    }
}
