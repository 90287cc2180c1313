//! Error types for the CloudMouse tools.
//!
//! Library crates use [`CloudMouseError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all CloudMouse tool operations.
#[derive(Debug, thiserror::Error)]
pub enum CloudMouseError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database error (connection, query, or integrity).
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad arguments, missing inputs, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Firmware flashing failed (tool missing, non-zero exit).
    #[error("flash error: {0}")]
    Flash(String),

    /// Serial port could not be opened, read, or written.
    #[error("serial error: {0}")]
    Serial(String),

    /// The device did not report a usable info block.
    #[error("device info error: {0}")]
    DeviceInfo(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CloudMouseError>;

impl CloudMouseError {
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
