//! Failing agent - every exchange fails.

use agent_daemon::{
    async_trait, Agent, AgentError, ImageParams, SpeechParams, TurnRequest, TurnStream,
};

/// An agent whose every exchange fails with a fixed message.
#[derive(Debug, Clone)]
pub struct FailingAgent {
    message: String,
}

impl FailingAgent {
    /// Create a failing agent with the given error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn stream(&self) -> TurnStream {
        let message = self.message.clone();
        let (tx, stream) = agent_daemon::turn_channel();
        tokio::spawn(async move {
            tx.failed(message).await;
        });
        stream
    }
}

impl Default for FailingAgent {
    fn default() -> Self {
        Self::new("agent unavailable")
    }
}

#[async_trait]
impl Agent for FailingAgent {
    async fn converse(&self, _request: TurnRequest) -> Result<TurnStream, AgentError> {
        Ok(self.stream())
    }

    async fn converse_with_speech(
        &self,
        _request: TurnRequest,
        _speech: SpeechParams,
    ) -> Result<TurnStream, AgentError> {
        Ok(self.stream())
    }

    async fn converse_with_image(
        &self,
        _request: TurnRequest,
        _image: ImageParams,
    ) -> Result<TurnStream, AgentError> {
        Ok(self.stream())
    }

    async fn record_note(
        &self,
        _brain_id: &str,
        _session_id: &str,
        _note: &str,
    ) -> Result<(), AgentError> {
        Err(AgentError::Daemon(self.message.clone()))
    }
}
