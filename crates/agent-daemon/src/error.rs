//! Error types for the agent daemon client.

use thiserror::Error;

/// Errors that can occur when talking to the agent daemon.
#[derive(Debug, Error)]
pub enum AgentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the daemon.
    #[error("daemon error: {0}")]
    Daemon(String),

    /// SSE stream error.
    #[error("SSE error: {0}")]
    Sse(String),

    /// Daemon health check failed.
    #[error("health check failed")]
    HealthCheckFailed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The event stream ended before a terminal event.
    #[error("turn stream closed before completion")]
    StreamClosed,
}
