//! Error types for brain configuration loading.

use thiserror::Error;

/// Errors that can occur while loading or resolving brain configuration.
#[derive(Debug, Error)]
pub enum BrainError {
    /// A brain file is missing a required field or has an invalid value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading a brain or profile file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A brain or profile file is not valid JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No brain registered under the given id.
    #[error("unknown brain: {0}")]
    UnknownBrain(String),
}
