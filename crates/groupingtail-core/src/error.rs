//! Error types for groupingtail.
//!
//! Construction-time failures (bad regex, bad config, UDP bind) use [`Error`]
//! and propagate to the caller. Per-line extraction failures use
//! [`AppendError`] and never leave an instrument's `write()`.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for groupingtail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("unknown instrument kind: {kind}")]
    UnknownInstrument { kind: String },

    #[error("instrument {kind} requires parameter {param}")]
    MissingParameter { kind: &'static str, param: &'static str },

    #[error("invalid source locator {locator:?}: {reason}")]
    InvalidSource { locator: String, reason: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind UDP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Outcome of a failed accumulation attempt for a single line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppendError {
    /// The captured text could not be converted to a number.
    /// The line is ignored and the instrument state is left unchanged.
    #[error("cannot convert {text:?} to a number")]
    Conversion { text: String },

    /// Anything else (e.g. an expected capture is missing).
    /// The instrument drops all accumulated state.
    #[error("instrument fault: {reason}")]
    Fault { reason: String },
}

impl AppendError {
    pub(crate) fn missing_capture(name: Option<&str>) -> Self {
        let reason = match name {
            Some(name) => format!("capture group {name:?} did not match"),
            None => "first capture group did not match".to_string(),
        };
        AppendError::Fault { reason }
    }
}
