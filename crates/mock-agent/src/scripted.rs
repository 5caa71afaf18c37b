//! Scripted agent - plays back queued event scripts and records calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use agent_daemon::{
    async_trait, Agent, AgentError, AgentEvent, ImageParams, SpeechParams, TurnOutcome,
    TurnRequest, TurnStream,
};
use tokio::sync::Mutex;

/// Which `Agent` call shape was invoked.
#[derive(Debug, Clone)]
pub enum CallShape {
    /// `converse`.
    Plain,
    /// `converse_with_speech`.
    Speech(SpeechParams),
    /// `converse_with_image`.
    Image(ImageParams),
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The request the orchestrator built.
    pub request: TurnRequest,
    /// The call shape used.
    pub shape: CallShape,
}

#[derive(Debug)]
struct Script {
    events: Vec<AgentEvent>,
    /// Sleep inserted before each event during playback.
    gap: Option<Duration>,
}

/// An agent that replays pre-queued scripts in FIFO order.
///
/// Each script is the full event sequence of one exchange. When the
/// queue is empty, exchanges fail with "script exhausted" - a test that
/// trips this made more calls than it queued.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    notes: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl ScriptedAgent {
    /// Create an agent with an empty script queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full event script for the next exchange.
    pub async fn push_events(&self, events: Vec<AgentEvent>) {
        self.scripts.lock().await.push_back(Script { events, gap: None });
    }

    /// Queue a script whose playback sleeps `gap` before each event,
    /// simulating a stream that trickles in over time.
    pub async fn push_paced_events(&self, events: Vec<AgentEvent>, gap: Duration) {
        self.scripts.lock().await.push_back(Script {
            events,
            gap: Some(gap),
        });
    }

    /// Queue a script consisting of a single terminal outcome.
    pub async fn push_outcome(&self, outcome: TurnOutcome) {
        self.push_events(vec![AgentEvent::Done(outcome)]).await;
    }

    /// All calls recorded so far.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Number of calls recorded so far.
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// All `(brain_id, session_id, note)` triples recorded so far.
    pub async fn notes(&self) -> Vec<(String, String, String)> {
        self.notes.lock().await.clone()
    }

    async fn play(&self, request: TurnRequest, shape: CallShape) -> TurnStream {
        self.calls.lock().await.push(RecordedCall {
            request,
            shape,
        });

        let script = self.scripts.lock().await.pop_front();
        let (tx, stream) = agent_daemon::turn_channel();
        tokio::spawn(async move {
            match script {
                Some(script) => {
                    for event in script.events {
                        if let Some(gap) = script.gap {
                            tokio::time::sleep(gap).await;
                        }
                        tx.emit(event).await;
                    }
                }
                None => tx.failed("script exhausted").await,
            }
        });
        stream
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn converse(&self, request: TurnRequest) -> Result<TurnStream, AgentError> {
        Ok(self.play(request, CallShape::Plain).await)
    }

    async fn converse_with_speech(
        &self,
        request: TurnRequest,
        speech: SpeechParams,
    ) -> Result<TurnStream, AgentError> {
        Ok(self.play(request, CallShape::Speech(speech)).await)
    }

    async fn converse_with_image(
        &self,
        request: TurnRequest,
        image: ImageParams,
    ) -> Result<TurnStream, AgentError> {
        Ok(self.play(request, CallShape::Image(image)).await)
    }

    async fn record_note(
        &self,
        brain_id: &str,
        session_id: &str,
        note: &str,
    ) -> Result<(), AgentError> {
        self.notes.lock().await.push((
            brain_id.to_string(),
            session_id.to_string(),
            note.to_string(),
        ));
        Ok(())
    }
}
