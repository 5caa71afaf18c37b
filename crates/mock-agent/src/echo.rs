//! Echo agent - replies with the request text.

use agent_daemon::{
    async_trait, Agent, AgentError, ImageParams, SpeechParams, TurnOutcome, TurnRequest,
    TurnStream,
};

/// A simple agent that echoes the user text back.
///
/// Useful for exercising the message flow without any AI processing.
/// Every exchange surfaces the fixed session id `echo-session`.
#[derive(Debug, Clone, Default)]
pub struct EchoAgent {
    /// Optional prefix added before the echo.
    prefix: Option<String>,
}

impl EchoAgent {
    /// Create a new EchoAgent with no prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new EchoAgent with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn reply(&self, request: &TurnRequest) -> TurnOutcome {
        let text = match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, request.text),
            None => request.text.clone(),
        };
        TurnOutcome::text(text).with_session("echo-session")
    }

    fn stream_reply(&self, request: &TurnRequest) -> TurnStream {
        let outcome = self.reply(request);
        let (tx, stream) = agent_daemon::turn_channel();
        tokio::spawn(async move {
            tx.done(outcome).await;
        });
        stream
    }
}

#[async_trait]
impl Agent for EchoAgent {
    async fn converse(&self, request: TurnRequest) -> Result<TurnStream, AgentError> {
        Ok(self.stream_reply(&request))
    }

    async fn converse_with_speech(
        &self,
        request: TurnRequest,
        _speech: SpeechParams,
    ) -> Result<TurnStream, AgentError> {
        Ok(self.stream_reply(&request))
    }

    async fn converse_with_image(
        &self,
        request: TurnRequest,
        _image: ImageParams,
    ) -> Result<TurnStream, AgentError> {
        Ok(self.stream_reply(&request))
    }

    async fn record_note(
        &self,
        _brain_id: &str,
        _session_id: &str,
        _note: &str,
    ) -> Result<(), AgentError> {
        Ok(())
    }
}
