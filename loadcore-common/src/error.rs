//! # Error Taxonomy
//!
//! Shared error type for the load-testing core, following the policy table
//! in the specification: configuration and parsing errors refuse to start,
//! runtime errors are recorded and surfaced without aborting, cancellation
//! is propagated but is never itself a threshold failure.

use thiserror::Error;

/// Crate-wide result alias.
pub type LoadcoreResult<T> = Result<T, LoadcoreError>;

/// Errors surfaced by the load-testing core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadcoreError {
    /// Invalid configuration, reported with a dotted path to the offending
    /// field (e.g. `scenarios.load.stages[1].target`).
    #[error("configuration error at {path}: {message}")]
    Config { path: String, message: String },

    /// Malformed duration string or threshold expression.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The calling context was cancelled while waiting on a blocking point.
    #[error("operation cancelled")]
    Cancelled,

    /// A runtime condition that does not map to a specific config/parse
    /// failure (e.g. an executor failing to assemble its VU pool).
    #[error("runtime error: {message}")]
    Runtime { message: String },
}

impl LoadcoreError {
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoadcoreError::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        LoadcoreError::Parse {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        LoadcoreError::Runtime {
            message: message.into(),
        }
    }
}
