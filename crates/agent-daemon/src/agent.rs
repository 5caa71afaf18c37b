//! The `Agent` trait consumed by the orchestrator.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::stream::TurnStream;
use crate::types::{ImageParams, SpeechParams, TurnRequest};

/// An external conversational agent.
///
/// Implemented by [`crate::AgentClient`] for the real daemon and by the
/// `mock-agent` crate for tests. All three call shapes return an event
/// stream; two-step flows emit `GenerationStarted` when step 2 begins.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Streamed conversational exchange. The agent may emit in-band
    /// `ToolImage` events when it decides to generate images itself.
    async fn converse(&self, request: TurnRequest) -> Result<TurnStream, AgentError>;

    /// Two-step exchange whose second step synthesizes speech from the
    /// agent's text reply.
    async fn converse_with_speech(
        &self,
        request: TurnRequest,
        speech: SpeechParams,
    ) -> Result<TurnStream, AgentError>;

    /// Two-step exchange whose second step generates an image derived
    /// from the agent's understanding of the request.
    async fn converse_with_image(
        &self,
        request: TurnRequest,
        image: ImageParams,
    ) -> Result<TurnStream, AgentError>;

    /// Append a system note to an existing session without generating a
    /// reply. Used to record out-of-band events (e.g. a nudge was sent)
    /// so the agent sees them on the next resumed turn.
    async fn record_note(
        &self,
        brain_id: &str,
        session_id: &str,
        note: &str,
    ) -> Result<(), AgentError>;
}
