//! Configuration for connecting to the agent daemon.

use std::env;

use crate::error::AgentError;

/// Configuration for connecting to the agent daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Base URL of the daemon HTTP server (e.g., "http://localhost:8790").
    pub base_url: String,
    /// Optional bearer token for authentication.
    pub api_key: Option<String>,
}

impl DaemonConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `AGENT_DAEMON_URL` - base URL (default: http://localhost:8790)
    /// - `AGENT_DAEMON_API_KEY` - optional bearer token
    pub fn from_env() -> Result<Self, AgentError> {
        let base_url =
            env::var("AGENT_DAEMON_URL").unwrap_or_else(|_| "http://localhost:8790".to_string());
        if base_url.trim().is_empty() {
            return Err(AgentError::Config("AGENT_DAEMON_URL is empty".to_string()));
        }
        Ok(Self {
            base_url,
            api_key: env::var("AGENT_DAEMON_API_KEY").ok(),
        })
    }

    /// Streamed conversational turn endpoint.
    pub fn turn_url(&self) -> String {
        format!("{}/api/v1/turn", self.base_url)
    }

    /// Two-step turn endpoint with speech synthesis.
    pub fn speech_url(&self) -> String {
        format!("{}/api/v1/turn/speech", self.base_url)
    }

    /// Two-step turn endpoint with image generation.
    pub fn image_url(&self) -> String {
        format!("{}/api/v1/turn/image", self.base_url)
    }

    /// Session note endpoint.
    pub fn note_url(&self) -> String {
        format!("{}/api/v1/session/note", self.base_url)
    }

    /// Health check endpoint.
    pub fn check_url(&self) -> String {
        format!("{}/api/v1/check", self.base_url)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new("http://localhost:8790")
    }
}
