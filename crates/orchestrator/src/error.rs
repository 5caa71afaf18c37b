//! Error types for orchestrator operations.

use agent_daemon::AgentError;
use brain_core::BrainError;
use thiserror::Error;
use troupe_database::DatabaseError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A bot was registered without required identity/credential/brain
    /// fields. Fatal at registration; that bot is skipped.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The agent call failed or returned no usable content.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Downloading or converting inbound media failed. The turn proceeds
    /// without media.
    #[error("media fetch failed: {0}")]
    MediaFetch(String),

    /// A channel send/edit/delete failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The ingestion channel reported an error.
    #[error("channel failure: {0}")]
    ChannelFailure(String),

    /// Channel recovery failed; the bot is marked failed and needs
    /// manual intervention.
    #[error("recovery failed: {0}")]
    Recovery(String),

    /// No bot registered under the given id.
    #[error("unknown bot: {0}")]
    UnknownBot(String),

    /// Persistence error.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Brain configuration error.
    #[error(transparent)]
    Brain(#[from] BrainError),
}
